//! Predicate tree construction
//!
//! Recursively maps a `where` argument object into a tagged predicate tree:
//! scalar operator leaves, AND/OR/NOT composition, and nested relation
//! filters that register (or reuse) joins at their relation path. All
//! argument-shape problems surface here, before any SQL exists.

use async_graphql::Value;

use crate::error::TranslateError;
use crate::metamodel::{Cardinality, EntityDescriptor, Metamodel};
use crate::query::plan::{JoinKind, JoinRegistry, JoinSpec};
use crate::query::values::{coerce, SqlValue};
use crate::schema::{FilterFieldType, FilterInputType, FilterOp};

/// The predicate tree, consumed by the SQL renderer
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Leaf {
        /// Table index the column lives on (0 = root)
        table: usize,
        column: String,
        op: FilterOp,
        values: Vec<SqlValue>,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

/// Recursive translator from filter arguments to [`Predicate`]
pub struct PredicateBuilder<'a> {
    metamodel: &'a Metamodel,
}

impl<'a> PredicateBuilder<'a> {
    pub fn new(metamodel: &'a Metamodel) -> Self {
        Self { metamodel }
    }

    /// Build the predicate for one filter object
    ///
    /// `filter_type` is the synthesized filter-input type for `entity` at
    /// the current recursion level, so the schema's depth cap is enforced
    /// structurally. An empty filter object yields `None` (pass-through).
    pub fn build(
        &self,
        entity: &EntityDescriptor,
        filter_type: &FilterInputType,
        filter: &Value,
        table: usize,
        path: &[String],
        joins: &mut JoinRegistry,
    ) -> Result<Option<Predicate>, TranslateError> {
        let object = match filter {
            Value::Object(obj) => obj,
            _ => {
                return Err(TranslateError::invalid_argument(
                    "where",
                    format!("expected a filter object, got {filter}"),
                ));
            }
        };

        let mut children = Vec::new();
        for (key, value) in object {
            match key.as_str() {
                "AND" => {
                    let group =
                        self.build_group(entity, filter_type, value, table, path, joins, "AND")?;
                    if !group.is_empty() {
                        children.push(Predicate::And(group));
                    }
                }
                "OR" => {
                    let group =
                        self.build_group(entity, filter_type, value, table, path, joins, "OR")?;
                    if !group.is_empty() {
                        children.push(Predicate::Or(group));
                    }
                }
                "NOT" => {
                    let group =
                        self.build_group(entity, filter_type, value, table, path, joins, "NOT")?;
                    if !group.is_empty() {
                        children.push(Predicate::Not(Box::new(Predicate::And(group))));
                    }
                }
                field => match filter_type.field(field) {
                    Some(FilterFieldType::Scalar { kind, ops }) => {
                        children.extend(self.build_leaves(
                            field, *kind, ops, value, table,
                        )?);
                    }
                    Some(FilterFieldType::Relation { target, nested }) => {
                        if matches!(value, Value::Object(obj) if obj.is_empty()) {
                            continue;
                        }
                        let relation = entity.relation(field).ok_or_else(|| {
                            TranslateError::unknown_field(&entity.name, field)
                        })?;
                        let target_entity = self.metamodel.entity(target).ok_or_else(|| {
                            TranslateError::unknown_field(&entity.name, field)
                        })?;

                        let mut child_path = path.to_vec();
                        child_path.push(field.to_string());
                        let (parent_column, child_column) = match relation.cardinality {
                            Cardinality::ToOne => {
                                (relation.fk_column.clone(), target_entity.pk().to_string())
                            }
                            Cardinality::ToMany => {
                                (entity.pk().to_string(), relation.fk_column.clone())
                            }
                        };
                        // Filter joins are inner; an existing selection join
                        // on the same path gets upgraded and shared.
                        let child_table = joins.resolve(JoinSpec {
                            path: child_path.clone(),
                            entity: target_entity.name.clone(),
                            table: target_entity.table.clone(),
                            kind: JoinKind::Inner,
                            parent: table,
                            parent_column,
                            child_column,
                            cardinality: relation.cardinality,
                        });

                        if let Some(nested_pred) = self.build(
                            target_entity,
                            nested,
                            value,
                            child_table,
                            &child_path,
                            joins,
                        )? {
                            children.push(nested_pred);
                        }
                    }
                    None => {
                        return Err(TranslateError::unknown_field(&entity.name, field));
                    }
                },
            }
        }

        Ok(match children.len() {
            0 => None,
            1 => Some(children.into_iter().next().expect("len checked")),
            _ => Some(Predicate::And(children)),
        })
    }

    /// A logical-composition argument: a list of filter objects, or a single
    /// object treated as a one-element list
    #[allow(clippy::too_many_arguments)]
    fn build_group(
        &self,
        entity: &EntityDescriptor,
        filter_type: &FilterInputType,
        value: &Value,
        table: usize,
        path: &[String],
        joins: &mut JoinRegistry,
        connective: &str,
    ) -> Result<Vec<Predicate>, TranslateError> {
        let items: Vec<&Value> = match value {
            Value::List(list) => list.iter().collect(),
            Value::Object(_) => vec![value],
            _ => {
                return Err(TranslateError::invalid_argument(
                    connective,
                    format!("expected a filter object or list, got {value}"),
                ));
            }
        };

        let mut predicates = Vec::with_capacity(items.len());
        for item in items {
            if let Some(p) = self.build(entity, filter_type, item, table, path, joins)? {
                predicates.push(p);
            }
        }
        Ok(predicates)
    }

    /// The operator object of one scalar attribute, e.g. `{EQ: "x", NE: "y"}`
    fn build_leaves(
        &self,
        field: &str,
        kind: crate::metamodel::ScalarKind,
        ops: &[FilterOp],
        value: &Value,
        table: usize,
    ) -> Result<Vec<Predicate>, TranslateError> {
        let object = match value {
            Value::Object(obj) => obj,
            _ => {
                return Err(TranslateError::invalid_argument(
                    field,
                    format!("expected an operator object, got {value}"),
                ));
            }
        };

        let mut leaves = Vec::new();
        for (op_name, op_value) in object {
            let op = FilterOp::parse(op_name).ok_or_else(|| {
                TranslateError::invalid_argument(field, format!("unknown operator `{op_name}`"))
            })?;
            if !ops.contains(&op) {
                return Err(TranslateError::invalid_argument(
                    field,
                    format!("operator {} not available for this field", op.name()),
                ));
            }

            let leaf = match op {
                FilterOp::In | FilterOp::NotIn => {
                    let list = expect_list(field, op, op_value)?;
                    let values = list
                        .iter()
                        .map(|v| coerce(v, kind, field))
                        .collect::<Result<Vec<_>, _>>()?;
                    Predicate::Leaf {
                        table,
                        column: field.to_string(),
                        op,
                        values,
                    }
                }
                FilterOp::Between => {
                    let list = expect_list(field, op, op_value)?;
                    if list.len() != 2 {
                        return Err(TranslateError::invalid_argument(
                            field,
                            format!("BETWEEN takes exactly two bounds, got {}", list.len()),
                        ));
                    }
                    let values = list
                        .iter()
                        .map(|v| coerce(v, kind, field))
                        .collect::<Result<Vec<_>, _>>()?;
                    Predicate::Leaf {
                        table,
                        column: field.to_string(),
                        op,
                        values,
                    }
                }
                FilterOp::IsNull | FilterOp::IsNotNull => {
                    let flag = match op_value {
                        Value::Boolean(b) => *b,
                        other => {
                            return Err(TranslateError::invalid_argument(
                                field,
                                format!("{} takes a boolean, got {other}", op.name()),
                            ));
                        }
                    };
                    // A false flag flips to the opposite null check.
                    let effective = match (op, flag) {
                        (FilterOp::IsNull, true) | (FilterOp::IsNotNull, false) => FilterOp::IsNull,
                        _ => FilterOp::IsNotNull,
                    };
                    Predicate::Leaf {
                        table,
                        column: field.to_string(),
                        op: effective,
                        values: Vec::new(),
                    }
                }
                _ => Predicate::Leaf {
                    table,
                    column: field.to_string(),
                    op,
                    values: vec![coerce(op_value, kind, field)?],
                },
            };
            leaves.push(leaf);
        }
        Ok(leaves)
    }
}

fn expect_list<'v>(
    field: &str,
    op: FilterOp,
    value: &'v Value,
) -> Result<&'v Vec<Value>, TranslateError> {
    match value {
        Value::List(list) => Ok(list),
        other => Err(TranslateError::invalid_argument(
            field,
            format!("{} takes a list, got {other}", op.name()),
        )),
    }
}
