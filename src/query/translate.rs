//! Selection-tree translation
//!
//! Depth-first walk of a root selection node producing a [`QueryPlan`]:
//! every attribute and relation is resolved against the synthesized schema,
//! joins are registered per relation path (selection joins left-outer,
//! filter joins inner, one join per path), ordering is validated against
//! sortable attributes, and paging bounds are fixed. Everything here fails
//! before any SQL is issued.

use async_graphql::Value;

use crate::error::TranslateError;
use crate::metamodel::{Cardinality, EntityDescriptor, Metamodel, ScalarKind};
use crate::query::document::SelectionNode;
use crate::query::page::parse_page_argument;
use crate::query::plan::{
    AggregateFunc, AggregateSel, ColumnRegistry, EnvelopeField, JoinKind, JoinRegistry, JoinSpec,
    OrderSpec, QueryPlan, ShapeNode,
};
use crate::query::predicate::PredicateBuilder;
use crate::schema::{EntityQueryType, FieldType, QuerySchema};

/// Translate one root field into a query plan
pub fn translate(
    schema: &QuerySchema,
    metamodel: &Metamodel,
    root: &SelectionNode,
) -> Result<QueryPlan, TranslateError> {
    let query_type = schema
        .entity(&root.name)
        .ok_or_else(|| TranslateError::unknown_field("Query", &root.name))?;
    let entity = metamodel
        .entity(&root.name)
        .ok_or_else(|| TranslateError::unknown_field("Query", &root.name))?;

    for key in root.arguments.keys() {
        if !matches!(key.as_str(), "where" | "orderBy" | "page") {
            return Err(TranslateError::invalid_argument(
                &root.name,
                format!("unknown argument `{key}`"),
            ));
        }
    }

    let paging = parse_page_argument(root.argument("page"))?;
    let order_by = parse_order_by(query_type, root.argument("orderBy"))?;

    let mut joins = JoinRegistry::default();
    let mut columns = ColumnRegistry::default();

    // Filter joins first so they take precedence; selection joins on the
    // same path reuse them.
    let predicate = match root.argument("where") {
        Some(filter) => PredicateBuilder::new(metamodel).build(
            entity,
            &query_type.filter,
            filter,
            0,
            &[],
            &mut joins,
        )?,
        None => None,
    };

    let root_pk_column = resolve_pk_column(&mut columns, 0, entity);
    // Order columns are always selected; the total wrapper re-sorts by them.
    for spec in &order_by {
        if let Some(attr) = entity.attribute(&spec.column) {
            columns.resolve(0, &spec.column, attr.kind);
        }
    }

    let mut walker = SelectionWalker {
        schema,
        metamodel,
        joins: &mut joins,
        columns: &mut columns,
    };

    let mut envelope = Vec::new();
    let mut wants_total = false;
    let mut has_select = false;
    for child in &root.children {
        match child.name.as_str() {
            "select" => {
                if has_select {
                    return Err(TranslateError::invalid_argument(
                        &root.name,
                        "duplicate `select` field",
                    ));
                }
                has_select = true;
                if !child.arguments.is_empty() {
                    return Err(TranslateError::invalid_argument(
                        "select",
                        "`select` takes no arguments",
                    ));
                }
                if child.children.is_empty() {
                    return Err(TranslateError::invalid_argument(
                        "select",
                        "`select` requires a subselection",
                    ));
                }
                let shape_children =
                    walker.walk(entity, query_type, &child.children, 0, &[])?;
                envelope.push(EnvelopeField::Select(ShapeNode::Object {
                    key: child.response_key().to_string(),
                    table: 0,
                    cardinality: Cardinality::ToMany,
                    pk_column: root_pk_column,
                    children: shape_children,
                }));
            }
            "total" => {
                expect_leaf_envelope(child)?;
                wants_total = true;
                envelope.push(EnvelopeField::Total {
                    key: child.response_key().to_string(),
                });
            }
            "pages" => {
                expect_leaf_envelope(child)?;
                wants_total = true;
                envelope.push(EnvelopeField::Pages {
                    key: child.response_key().to_string(),
                });
            }
            other => {
                return Err(TranslateError::unknown_field(&root.name, other));
            }
        }
    }
    if envelope.is_empty() {
        return Err(TranslateError::invalid_argument(
            &root.name,
            "selection must request `select`, `total` or `pages`",
        ));
    }

    Ok(QueryPlan {
        entity: entity.name.clone(),
        response_key: root.response_key().to_string(),
        root_table: entity.table.clone(),
        root_pk_column,
        joins: joins.into_joins(),
        columns: columns.into_columns(),
        predicate,
        order_by,
        paging,
        envelope,
        wants_total,
    })
}

fn expect_leaf_envelope(node: &SelectionNode) -> Result<(), TranslateError> {
    if !node.children.is_empty() || !node.arguments.is_empty() {
        return Err(TranslateError::invalid_argument(
            &node.name,
            format!("`{}` is a leaf field", node.name),
        ));
    }
    Ok(())
}

fn resolve_pk_column(columns: &mut ColumnRegistry, table: usize, entity: &EntityDescriptor) -> usize {
    let pk = entity.pk();
    let kind = entity.attribute(pk).map(|a| a.kind).unwrap_or(ScalarKind::Id);
    columns.resolve(table, pk, kind)
}

fn parse_order_by(
    query_type: &EntityQueryType,
    argument: Option<&Value>,
) -> Result<Vec<OrderSpec>, TranslateError> {
    let entries: Vec<&Value> = match argument {
        None => return Ok(Vec::new()),
        Some(Value::List(list)) => list.iter().collect(),
        Some(obj @ Value::Object(_)) => vec![obj],
        Some(other) => {
            return Err(TranslateError::invalid_argument(
                "orderBy",
                format!("expected a list of order entries, got {other}"),
            ));
        }
    };

    let mut specs = Vec::with_capacity(entries.len());
    for entry in entries {
        let object = match entry {
            Value::Object(obj) => obj,
            other => {
                return Err(TranslateError::invalid_argument(
                    "orderBy",
                    format!("expected an order entry object, got {other}"),
                ));
            }
        };

        let mut field: Option<String> = None;
        let mut ascending = true;
        for (key, value) in object {
            match key.as_str() {
                "field" => match value {
                    Value::String(s) => field = Some(s.clone()),
                    other => {
                        return Err(TranslateError::invalid_argument(
                            "orderBy",
                            format!("`field` must be an attribute name, got {other}"),
                        ));
                    }
                },
                "direction" => {
                    let name = match value {
                        Value::Enum(n) => n.as_str().to_string(),
                        Value::String(s) => s.clone(),
                        other => {
                            return Err(TranslateError::invalid_argument(
                                "orderBy",
                                format!("`direction` must be ASC or DESC, got {other}"),
                            ));
                        }
                    };
                    ascending = match name.as_str() {
                        "ASC" => true,
                        "DESC" => false,
                        other => {
                            return Err(TranslateError::invalid_argument(
                                "orderBy",
                                format!("`direction` must be ASC or DESC, got {other}"),
                            ));
                        }
                    };
                }
                other => {
                    return Err(TranslateError::invalid_argument(
                        "orderBy",
                        format!("unknown order entry key `{other}`"),
                    ));
                }
            }
        }

        let field = field.ok_or_else(|| {
            TranslateError::invalid_argument("orderBy", "order entry is missing `field`")
        })?;
        if !query_type.sortable.iter().any(|s| s == &field) {
            return Err(TranslateError::invalid_argument(
                "orderBy",
                format!("`{field}` is not sortable"),
            ));
        }
        specs.push(OrderSpec {
            column: field,
            ascending,
        });
    }
    Ok(specs)
}

/// Recursive selection walk, accumulating joins, columns and shape nodes
struct SelectionWalker<'a> {
    schema: &'a QuerySchema,
    metamodel: &'a Metamodel,
    joins: &'a mut JoinRegistry,
    columns: &'a mut ColumnRegistry,
}

impl SelectionWalker<'_> {
    fn walk(
        &mut self,
        entity: &EntityDescriptor,
        query_type: &EntityQueryType,
        nodes: &[SelectionNode],
        table: usize,
        path: &[String],
    ) -> Result<Vec<ShapeNode>, TranslateError> {
        let mut shapes = Vec::with_capacity(nodes.len());
        for node in nodes {
            match query_type.field(&node.name) {
                Some(FieldType::Scalar { kind, .. }) => {
                    if !node.children.is_empty() {
                        return Err(TranslateError::invalid_argument(
                            &node.name,
                            "scalar fields take no subselection",
                        ));
                    }
                    let column = self.columns.resolve(table, &node.name, *kind);
                    shapes.push(ShapeNode::Scalar {
                        key: node.response_key().to_string(),
                        column,
                    });
                }
                Some(FieldType::Relation { target, cardinality }) => {
                    shapes.push(self.walk_relation(
                        entity,
                        node,
                        target,
                        *cardinality,
                        table,
                        path,
                    )?);
                }
                None => {
                    return Err(TranslateError::unknown_field(&query_type.entity, &node.name));
                }
            }
        }
        Ok(shapes)
    }

    fn walk_relation(
        &mut self,
        entity: &EntityDescriptor,
        node: &SelectionNode,
        target: &str,
        cardinality: Cardinality,
        table: usize,
        path: &[String],
    ) -> Result<ShapeNode, TranslateError> {
        if !node.arguments.is_empty() {
            return Err(TranslateError::invalid_argument(
                &node.name,
                "relation fields take no arguments; filter through `where` on the root",
            ));
        }
        if node.children.is_empty() {
            return Err(TranslateError::invalid_argument(
                &node.name,
                "relation fields require a subselection",
            ));
        }

        let relation = entity
            .relation(&node.name)
            .ok_or_else(|| TranslateError::unknown_field(&entity.name, &node.name))?;
        let target_entity = self
            .metamodel
            .entity(target)
            .ok_or_else(|| TranslateError::unknown_field(&entity.name, &node.name))?;
        let target_type = self
            .schema
            .entity(target)
            .ok_or_else(|| TranslateError::unknown_field(&entity.name, &node.name))?;

        let mut child_path = path.to_vec();
        child_path.push(node.name.clone());
        let (parent_column, child_column) = match cardinality {
            Cardinality::ToOne => (
                relation.fk_column.clone(),
                target_entity.pk().to_string(),
            ),
            Cardinality::ToMany => (
                entity.pk().to_string(),
                relation.fk_column.clone(),
            ),
        };
        // Selection joins are left-outer; if a filter already claimed this
        // path the existing inner join is reused unchanged.
        let child_table = self.joins.resolve(JoinSpec {
            path: child_path.clone(),
            entity: target_entity.name.clone(),
            table: target_entity.table.clone(),
            kind: JoinKind::LeftOuter,
            parent: table,
            parent_column,
            child_column,
            cardinality,
        });

        let pk_column = resolve_pk_column(self.columns, child_table, target_entity);

        let has_aggregate = node.children.iter().any(|c| c.name == "aggregate");
        if has_aggregate && cardinality != Cardinality::ToMany {
            return Err(TranslateError::invalid_argument(
                "aggregate",
                "aggregation applies to to-many relations only",
            ));
        }
        if has_aggregate && node.children.len() > 1 {
            // An aggregated relation renders as a summary object, not a
            // list, so entity fields cannot appear alongside it.
            return Err(TranslateError::invalid_argument(
                "aggregate",
                "`aggregate` cannot be mixed with entity fields",
            ));
        }

        let mut children = Vec::with_capacity(node.children.len());
        for child in &node.children {
            if child.name == "aggregate" {
                children.push(self.walk_aggregate(child, target_entity, child_table)?);
            } else {
                children.extend(self.walk(
                    target_entity,
                    target_type,
                    std::slice::from_ref(child),
                    child_table,
                    &child_path,
                )?);
            }
        }

        Ok(ShapeNode::Object {
            key: node.response_key().to_string(),
            table: child_table,
            cardinality,
            pk_column,
            children,
        })
    }

    fn walk_aggregate(
        &mut self,
        node: &SelectionNode,
        target_entity: &EntityDescriptor,
        child_table: usize,
    ) -> Result<ShapeNode, TranslateError> {
        if node.children.is_empty() {
            return Err(TranslateError::invalid_argument(
                "aggregate",
                "`aggregate` requires a subselection",
            ));
        }

        let mut items = Vec::with_capacity(node.children.len());
        for func_node in &node.children {
            let func = AggregateFunc::parse(&func_node.name).ok_or_else(|| {
                TranslateError::unknown_field("aggregate", &func_node.name)
            })?;
            if !func_node.children.is_empty() {
                return Err(TranslateError::invalid_argument(
                    &func_node.name,
                    "aggregate functions are leaf fields",
                ));
            }

            let column = if func == AggregateFunc::Count {
                if !func_node.arguments.is_empty() {
                    return Err(TranslateError::invalid_argument(
                        "count",
                        "`count` takes no arguments",
                    ));
                }
                None
            } else {
                let of = match func_node.argument("of") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => {
                        return Err(TranslateError::invalid_argument(
                            &func_node.name,
                            format!("`of` must be an attribute name, got {other}"),
                        ));
                    }
                    None => {
                        return Err(TranslateError::invalid_argument(
                            &func_node.name,
                            "missing `of` argument",
                        ));
                    }
                };
                let attr = target_entity.attribute(&of).ok_or_else(|| {
                    TranslateError::unknown_field(&target_entity.name, &of)
                })?;
                let numeric_only = matches!(func, AggregateFunc::Sum | AggregateFunc::Avg);
                let allowed = if numeric_only {
                    matches!(attr.kind, ScalarKind::Int | ScalarKind::Float)
                } else {
                    attr.kind.is_ordered()
                };
                if !allowed {
                    return Err(TranslateError::invalid_argument(
                        &func_node.name,
                        format!("attribute `{of}` cannot be aggregated with this function"),
                    ));
                }
                Some(self.columns.resolve(child_table, &of, attr.kind))
            };

            items.push(AggregateSel {
                key: func_node.response_key().to_string(),
                func,
                column,
            });
        }

        Ok(ShapeNode::Aggregate {
            key: node.response_key().to_string(),
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::config::EngineConfig;
    use crate::metamodel::AttributeDescriptor;
    use crate::query::document::parse_document;
    use crate::schema::synthesize;

    fn metamodel() -> Metamodel {
        Metamodel::builder()
            .entity("Books", "books", |e| {
                e.primary_key("id")
                    .attribute(AttributeDescriptor::new("id", ScalarKind::Id))
                    .attribute(AttributeDescriptor::new("title", ScalarKind::Text))
                    .attribute(
                        AttributeDescriptor::new("notes", ScalarKind::Text)
                            .nullable()
                            .not_sortable(),
                    )
                    .to_one("author", "Authors", "author_id")
                    .to_many("reviews", "Reviews", "book_id")
            })
            .entity("Authors", "authors", |e| {
                e.primary_key("id")
                    .attribute(AttributeDescriptor::new("id", ScalarKind::Id))
                    .attribute(AttributeDescriptor::new("name", ScalarKind::Text))
                    .to_many("books", "Books", "author_id")
            })
            .entity("Reviews", "reviews", |e| {
                e.primary_key("id")
                    .attribute(AttributeDescriptor::new("id", ScalarKind::Id))
                    .attribute(AttributeDescriptor::new("stars", ScalarKind::Int))
                    .to_one("book", "Books", "book_id")
            })
            .build()
    }

    fn plan_for(doc: &str) -> Result<QueryPlan, TranslateError> {
        let metamodel = metamodel();
        let schema = synthesize(&metamodel, &EngineConfig::default()).unwrap();
        let roots = parse_document(doc, &async_graphql::Variables::default()).unwrap();
        translate(&schema, &metamodel, &roots[0])
    }

    #[test]
    fn shared_path_emits_exactly_one_join() {
        // `author` is referenced by both the filter and the selection.
        let plan = plan_for(
            r#"query {
                Books(where: {author: {name: {EQ: "Herbert"}}}) {
                    select { title author { name } }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(plan.joins.len(), 1);
        // Filter join wins: inner, shared with the selection.
        assert_eq!(plan.joins[0].kind, JoinKind::Inner);
    }

    #[test]
    fn selection_only_relation_joins_are_left_outer() {
        let plan = plan_for("query { Books { select { title reviews { stars } } } }").unwrap();
        assert_eq!(plan.joins.len(), 1);
        assert_eq!(plan.joins[0].kind, JoinKind::LeftOuter);
        assert_eq!(plan.joins[0].cardinality, Cardinality::ToMany);
    }

    #[test]
    fn group_keys_are_selected_even_when_not_requested() {
        let plan = plan_for("query { Books { select { title reviews { stars } } } }").unwrap();
        // Root pk, title, review pk, stars.
        assert!(plan
            .columns
            .iter()
            .any(|c| c.table == 0 && c.column == "id"));
        assert!(plan
            .columns
            .iter()
            .any(|c| c.table == 1 && c.column == "id"));
    }

    #[test]
    fn unknown_selection_field_is_rejected() {
        let err = plan_for("query { Books { select { isbn } } }").unwrap_err();
        assert_matches!(
            err,
            TranslateError::UnknownField { parent, field } if parent == "Books" && field == "isbn"
        );
    }

    #[test]
    fn unknown_root_entity_is_rejected() {
        let err = plan_for("query { Magazines { select { title } } }").unwrap_err();
        assert_matches!(
            err,
            TranslateError::UnknownField { parent, .. } if parent == "Query"
        );
    }

    #[test]
    fn non_sortable_attribute_in_order_by_is_rejected() {
        let err = plan_for(
            r#"query { Books(orderBy: [{field: "notes"}]) { select { title } } }"#,
        )
        .unwrap_err();
        assert_matches!(
            err,
            TranslateError::InvalidArgument { field, .. } if field == "orderBy"
        );
    }

    #[test]
    fn order_by_direction_defaults_to_ascending() {
        let plan = plan_for(
            r#"query { Books(orderBy: [{field: "title"}, {field: "id", direction: DESC}]) { select { title } } }"#,
        )
        .unwrap();
        assert_eq!(
            plan.order_by,
            vec![
                OrderSpec { column: "title".into(), ascending: true },
                OrderSpec { column: "id".into(), ascending: false },
            ]
        );
    }

    #[test]
    fn mixed_paging_styles_fail_before_sql() {
        let err = plan_for(
            r#"query { Books(page: {offset: 0, cursor: "x", limit: 5}) { select { title } } }"#,
        )
        .unwrap_err();
        assert_matches!(
            err,
            TranslateError::AmbiguousPaging | TranslateError::InvalidArgument { .. }
        );
    }

    #[test]
    fn aggregate_on_to_many_resolves_source_columns() {
        let plan = plan_for(
            r#"query { Books { select { title reviews { aggregate { count avg(of: "stars") } } } } }"#,
        )
        .unwrap();
        let select = match &plan.envelope[0] {
            EnvelopeField::Select(s) => s,
            other => panic!("expected select, got {other:?}"),
        };
        let reviews = match select {
            ShapeNode::Object { children, .. } => &children[1],
            other => panic!("unexpected shape {other:?}"),
        };
        let aggregate = match reviews {
            ShapeNode::Object { children, .. } => &children[0],
            other => panic!("unexpected shape {other:?}"),
        };
        assert_matches!(aggregate, ShapeNode::Aggregate { items, .. } if items.len() == 2);
    }

    #[test]
    fn aggregate_on_to_one_is_rejected() {
        let err =
            plan_for("query { Books { select { author { aggregate { count } } } } }").unwrap_err();
        assert_matches!(err, TranslateError::InvalidArgument { field, .. } if field == "aggregate");
    }

    #[test]
    fn total_and_pages_mark_the_plan() {
        let plan = plan_for("query { Books { select { title } total pages } }").unwrap();
        assert!(plan.wants_total);
        assert_eq!(plan.envelope.len(), 3);
    }
}
