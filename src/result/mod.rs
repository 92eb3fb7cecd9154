//! Result assembly
//!
//! Outer joins for to-many relations multiply rows, so raw result rows are
//! regrouped before they become the caller's nested structure: rows group by
//! the root primary key, then by each nested entity's primary key within its
//! parent group, preserving first-seen order. A relation with no joined rows
//! is an empty list (to-many) or null (to-one), never an absent key.

use async_graphql::{Name, Value};
use indexmap::IndexMap;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::metamodel::{Cardinality, ScalarKind};
use crate::query::plan::{AggregateFunc, AggregateSel, EnvelopeField, QueryPlan, ShapeNode};
use crate::query::values::SqlValue;

/// One decoded result row
#[derive(Debug)]
pub struct RowData {
    values: Vec<SqlValue>,
    total: Option<i64>,
}

/// Decode raw store rows into typed values per the plan's column kinds
pub fn decode_rows(rows: &[SqliteRow], plan: &QueryPlan) -> Result<Vec<RowData>, sqlx::Error> {
    let mut decoded = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(plan.columns.len());
        for (i, col) in plan.columns.iter().enumerate() {
            values.push(decode_column(row, i, col.kind)?);
        }
        let total = if plan.wants_total {
            row.try_get::<Option<i64>, _>(plan.columns.len())?
        } else {
            None
        };
        decoded.push(RowData { values, total });
    }
    Ok(decoded)
}

fn decode_column(row: &SqliteRow, index: usize, kind: ScalarKind) -> Result<SqlValue, sqlx::Error> {
    let value = match kind {
        ScalarKind::Int => row
            .try_get::<Option<i64>, _>(index)?
            .map_or(SqlValue::Null, SqlValue::Int),
        ScalarKind::Float => match row.try_get::<Option<f64>, _>(index) {
            Ok(v) => v.map_or(SqlValue::Null, SqlValue::Float),
            // SQLite may hand back an integer affinity for whole numbers.
            Err(_) => row
                .try_get::<Option<i64>, _>(index)?
                .map_or(SqlValue::Null, |n| SqlValue::Float(n as f64)),
        },
        ScalarKind::Bool => row
            .try_get::<Option<bool>, _>(index)?
            .map_or(SqlValue::Null, SqlValue::Bool),
        ScalarKind::Id => match row.try_get::<Option<i64>, _>(index) {
            Ok(v) => v.map_or(SqlValue::Null, SqlValue::Int),
            Err(_) => row
                .try_get::<Option<String>, _>(index)?
                .map_or(SqlValue::Null, SqlValue::Text),
        },
        ScalarKind::Text | ScalarKind::Enum | ScalarKind::Date => row
            .try_get::<Option<String>, _>(index)?
            .map_or(SqlValue::Null, SqlValue::Text),
    };
    Ok(value)
}

/// Assemble the envelope object for one executed root field
pub fn assemble(rows: &[RowData], plan: &QueryPlan) -> Value {
    let total = rows.first().and_then(|r| r.total).unwrap_or(0);

    let row_refs: Vec<&RowData> = rows.iter().collect();
    let mut envelope = IndexMap::new();
    for field in &plan.envelope {
        match field {
            EnvelopeField::Select(shape) => {
                if let ShapeNode::Object {
                    key,
                    pk_column,
                    children,
                    ..
                } = shape
                {
                    envelope.insert(
                        Name::new(key),
                        assemble_list(&row_refs, *pk_column, children),
                    );
                }
            }
            EnvelopeField::Total { key } => {
                envelope.insert(Name::new(key), Value::from(total));
            }
            EnvelopeField::Pages { key } => {
                envelope.insert(Name::new(key), Value::from(page_count(total, plan)));
            }
        }
    }
    Value::Object(envelope)
}

fn page_count(total: i64, plan: &QueryPlan) -> i64 {
    match plan.paging.limit {
        Some(limit) if limit > 0 => (total + limit - 1) / limit,
        Some(_) => 0,
        // Unbounded queries are one page when anything matched.
        None => i64::from(total > 0),
    }
}

/// Group `rows` by the primary-key column and build one object per group,
/// first-seen order
fn assemble_list(rows: &[&RowData], pk_column: usize, children: &[ShapeNode]) -> Value {
    let groups = group_by_key(rows, pk_column);
    let list = groups
        .into_iter()
        .map(|(_, group)| assemble_object(&group, children))
        .collect();
    Value::List(list)
}

fn assemble_object(rows: &[&RowData], children: &[ShapeNode]) -> Value {
    let mut object = IndexMap::new();
    let first = rows.first().copied();
    for child in children {
        match child {
            ShapeNode::Scalar { key, column } => {
                let value = first
                    .map(|row| sql_to_value(&row.values[*column]))
                    .unwrap_or(Value::Null);
                object.insert(Name::new(key), value);
            }
            ShapeNode::Object {
                key,
                cardinality,
                pk_column,
                children: nested,
                ..
            } => {
                let value = match cardinality {
                    Cardinality::ToMany => match nested.first() {
                        // An aggregated relation renders as a summary
                        // object instead of a list.
                        Some(ShapeNode::Aggregate { key: agg_key, items }) => {
                            let mut wrapper = IndexMap::new();
                            wrapper.insert(
                                Name::new(agg_key),
                                aggregate_group(rows, *pk_column, items),
                            );
                            Value::Object(wrapper)
                        }
                        _ => assemble_list(rows, *pk_column, nested),
                    },
                    Cardinality::ToOne => {
                        let present = first
                            .and_then(|row| key_of(&row.values[*pk_column]))
                            .is_some();
                        if present {
                            assemble_object(rows, nested)
                        } else {
                            Value::Null
                        }
                    }
                };
                object.insert(Name::new(key), value);
            }
            // Reached only through the to-many wrapper above.
            ShapeNode::Aggregate { .. } => {}
        }
    }
    Value::Object(object)
}

/// Compute aggregates over the distinct child rows of one parent group
fn aggregate_group(rows: &[&RowData], pk_column: usize, items: &[AggregateSel]) -> Value {
    let groups = group_by_key(rows, pk_column);
    let distinct: Vec<&RowData> = groups
        .into_iter()
        .filter_map(|(_, group)| group.first().copied())
        .collect();

    let mut object = IndexMap::new();
    for item in items {
        let value = match item.func {
            AggregateFunc::Count => Value::from(distinct.len() as i64),
            _ => {
                let column = match item.column {
                    Some(c) => c,
                    None => {
                        object.insert(Name::new(&item.key), Value::Null);
                        continue;
                    }
                };
                let values: Vec<&SqlValue> = distinct
                    .iter()
                    .map(|row| &row.values[column])
                    .filter(|v| !matches!(v, SqlValue::Null))
                    .collect();
                fold_aggregate(item.func, &values)
            }
        };
        object.insert(Name::new(&item.key), value);
    }
    Value::Object(object)
}

/// SQL aggregate semantics: empty input folds to null, sums of integers stay
/// integral
fn fold_aggregate(func: AggregateFunc, values: &[&SqlValue]) -> Value {
    if values.is_empty() {
        return Value::Null;
    }
    match func {
        AggregateFunc::Sum => {
            if values.iter().all(|v| matches!(v, SqlValue::Int(_))) {
                let sum: i64 = values
                    .iter()
                    .map(|v| match v {
                        SqlValue::Int(n) => *n,
                        _ => 0,
                    })
                    .sum();
                Value::from(sum)
            } else {
                float_value(values.iter().map(|v| as_f64(v)).sum())
            }
        }
        AggregateFunc::Avg => {
            let sum: f64 = values.iter().map(|v| as_f64(v)).sum();
            float_value(sum / values.len() as f64)
        }
        AggregateFunc::Min => extremum(values, false),
        AggregateFunc::Max => extremum(values, true),
        AggregateFunc::Count => Value::from(values.len() as i64),
    }
}

fn extremum(values: &[&SqlValue], max: bool) -> Value {
    let best = values.iter().copied().reduce(|a, b| {
        let ordering = compare(a, b);
        let keep_b = if max {
            ordering == std::cmp::Ordering::Less
        } else {
            ordering == std::cmp::Ordering::Greater
        };
        if keep_b { b } else { a }
    });
    best.map(sql_to_value).unwrap_or(Value::Null)
}

fn compare(a: &SqlValue, b: &SqlValue) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (SqlValue::Int(x), SqlValue::Int(y)) => x.cmp(y),
        (SqlValue::Text(x), SqlValue::Text(y)) => x.cmp(y),
        _ => as_f64(a).partial_cmp(&as_f64(b)).unwrap_or(Ordering::Equal),
    }
}

fn as_f64(value: &SqlValue) -> f64 {
    match value {
        SqlValue::Int(n) => *n as f64,
        SqlValue::Float(f) => *f,
        _ => 0.0,
    }
}

fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Grouping key derived from a primary-key value; null keys mean "no joined
/// row" and are dropped
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueKey {
    Int(i64),
    Text(String),
    Bool(bool),
    Bits(u64),
}

fn key_of(value: &SqlValue) -> Option<ValueKey> {
    match value {
        SqlValue::Int(n) => Some(ValueKey::Int(*n)),
        SqlValue::Text(s) => Some(ValueKey::Text(s.clone())),
        SqlValue::Bool(b) => Some(ValueKey::Bool(*b)),
        SqlValue::Float(f) => Some(ValueKey::Bits(f.to_bits())),
        SqlValue::Null => None,
    }
}

fn group_by_key<'r>(
    rows: &[&'r RowData],
    pk_column: usize,
) -> IndexMap<ValueKey, Vec<&'r RowData>> {
    let mut groups: IndexMap<ValueKey, Vec<&RowData>> = IndexMap::new();
    for row in rows {
        if let Some(key) = key_of(&row.values[pk_column]) {
            groups.entry(key).or_default().push(row);
        }
    }
    groups
}

fn sql_to_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Text(s) => Value::String(s.clone()),
        SqlValue::Int(n) => Value::from(*n),
        SqlValue::Float(f) => float_value(*f),
        SqlValue::Bool(b) => Value::Boolean(*b),
        SqlValue::Null => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::metamodel::Cardinality;
    use crate::query::plan::{AggregateFunc, AggregateSel, ShapeNode};

    fn row(values: Vec<SqlValue>) -> RowData {
        RowData {
            values,
            total: None,
        }
    }

    fn scalar(key: &str, column: usize) -> ShapeNode {
        ShapeNode::Scalar {
            key: key.to_string(),
            column,
        }
    }

    #[test]
    fn fan_out_rows_group_into_distinct_children() {
        // Columns: 0 = book id, 1 = title, 2 = review id, 3 = stars.
        // Book 1 has two reviews; the sibling join duplicated each review row.
        let rows = vec![
            row(vec![
                SqlValue::Int(1),
                SqlValue::Text("Dune".into()),
                SqlValue::Int(10),
                SqlValue::Int(5),
            ]),
            row(vec![
                SqlValue::Int(1),
                SqlValue::Text("Dune".into()),
                SqlValue::Int(10),
                SqlValue::Int(5),
            ]),
            row(vec![
                SqlValue::Int(1),
                SqlValue::Text("Dune".into()),
                SqlValue::Int(11),
                SqlValue::Int(3),
            ]),
        ];
        let shape = vec![
            scalar("title", 1),
            ShapeNode::Object {
                key: "reviews".into(),
                table: 1,
                cardinality: Cardinality::ToMany,
                pk_column: 2,
                children: vec![scalar("stars", 3)],
            },
        ];

        let refs: Vec<&RowData> = rows.iter().collect();
        let value = assemble_list(&refs, 0, &shape);
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            serde_json::json!([
                {"title": "Dune", "reviews": [{"stars": 5}, {"stars": 3}]}
            ])
        );
    }

    #[test]
    fn to_many_with_no_children_is_an_empty_list() {
        let rows = vec![row(vec![
            SqlValue::Int(1),
            SqlValue::Text("Dune".into()),
            SqlValue::Null,
            SqlValue::Null,
        ])];
        let shape = vec![
            scalar("title", 1),
            ShapeNode::Object {
                key: "reviews".into(),
                table: 1,
                cardinality: Cardinality::ToMany,
                pk_column: 2,
                children: vec![scalar("stars", 3)],
            },
        ];

        let refs: Vec<&RowData> = rows.iter().collect();
        let value = assemble_list(&refs, 0, &shape);
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            serde_json::json!([{"title": "Dune", "reviews": []}])
        );
    }

    #[test]
    fn to_one_with_no_joined_row_is_null() {
        let rows = vec![row(vec![
            SqlValue::Int(1),
            SqlValue::Text("Anonymous Work".into()),
            SqlValue::Null,
            SqlValue::Null,
        ])];
        let shape = vec![
            scalar("title", 1),
            ShapeNode::Object {
                key: "author".into(),
                table: 1,
                cardinality: Cardinality::ToOne,
                pk_column: 2,
                children: vec![scalar("name", 3)],
            },
        ];

        let refs: Vec<&RowData> = rows.iter().collect();
        let value = assemble_list(&refs, 0, &shape);
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            serde_json::json!([{"title": "Anonymous Work", "author": null}])
        );
    }

    #[test]
    fn aggregates_fold_distinct_children_only() {
        // Review 10 appears twice through fan-out; it must count once.
        let rows = vec![
            row(vec![SqlValue::Int(1), SqlValue::Int(10), SqlValue::Int(4)]),
            row(vec![SqlValue::Int(1), SqlValue::Int(10), SqlValue::Int(4)]),
            row(vec![SqlValue::Int(1), SqlValue::Int(11), SqlValue::Int(2)]),
        ];
        let shape = vec![ShapeNode::Object {
            key: "reviews".into(),
            table: 1,
            cardinality: Cardinality::ToMany,
            pk_column: 1,
            children: vec![ShapeNode::Aggregate {
                key: "aggregate".into(),
                items: vec![
                    AggregateSel {
                        key: "count".into(),
                        func: AggregateFunc::Count,
                        column: None,
                    },
                    AggregateSel {
                        key: "sum".into(),
                        func: AggregateFunc::Sum,
                        column: Some(2),
                    },
                    AggregateSel {
                        key: "avg".into(),
                        func: AggregateFunc::Avg,
                        column: Some(2),
                    },
                    AggregateSel {
                        key: "max".into(),
                        func: AggregateFunc::Max,
                        column: Some(2),
                    },
                ],
            }],
        }];

        let refs: Vec<&RowData> = rows.iter().collect();
        let value = assemble_list(&refs, 0, &shape);
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            serde_json::json!([{
                "reviews": {"aggregate": {"count": 2, "sum": 6, "avg": 3.0, "max": 4}}
            }])
        );
    }

    #[test]
    fn first_seen_order_is_preserved() {
        let rows = vec![
            row(vec![SqlValue::Int(3)]),
            row(vec![SqlValue::Int(1)]),
            row(vec![SqlValue::Int(3)]),
            row(vec![SqlValue::Int(2)]),
        ];
        let refs: Vec<&RowData> = rows.iter().collect();
        let value = assemble_list(&refs, 0, &[scalar("id", 0)]);
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            serde_json::json!([{"id": 3}, {"id": 1}, {"id": 2}])
        );
    }
}
