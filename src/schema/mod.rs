//! Query-schema synthesis
//!
//! Builds, once per metamodel, the typed query surface: per entity one
//! queryable type (attributes plus relation fields) and one filter-input type
//! (operator sets per scalar attribute, nested relation filters with a
//! depth-aware cycle guard). The result is an explicit in-memory registry,
//! shared read-only across all requests.

pub mod filters;

use indexmap::IndexMap;

use crate::config::EngineConfig;
use crate::error::SchemaBuildError;
use crate::metamodel::{Cardinality, EntityDescriptor, Metamodel, ScalarKind};

pub use filters::{operators_for, FilterOp};

/// One output field of an entity's query type
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Scalar { kind: ScalarKind, nullable: bool },
    Relation {
        target: String,
        cardinality: Cardinality,
    },
}

/// One field of a generated filter-input type
#[derive(Debug, Clone, PartialEq)]
pub enum FilterFieldType {
    Scalar {
        kind: ScalarKind,
        ops: Vec<FilterOp>,
    },
    /// Nested relation filter; the nested shape is expanded inline so the
    /// depth cap is part of the generated structure, not a runtime check
    Relation {
        target: String,
        nested: FilterInputType,
    },
}

/// The filter-input type of one entity at one recursion level
#[derive(Debug, Clone, PartialEq)]
pub struct FilterInputType {
    pub fields: IndexMap<String, FilterFieldType>,
}

impl FilterInputType {
    pub fn field(&self, name: &str) -> Option<&FilterFieldType> {
        self.fields.get(name)
    }
}

/// The synthesized query surface of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityQueryType {
    pub entity: String,
    /// Attribute and relation output fields, declaration order
    pub fields: IndexMap<String, FieldType>,
    /// Attributes accepted in `orderBy`
    pub sortable: Vec<String>,
    pub filter: FilterInputType,
}

impl EntityQueryType {
    pub fn field(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name)
    }
}

/// The whole synthesized schema, keyed by entity name
///
/// Built once, read-only thereafter; rebuilding requires re-running
/// [`synthesize`] against the full metamodel.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySchema {
    entities: IndexMap<String, EntityQueryType>,
}

impl QuerySchema {
    pub fn entity(&self, name: &str) -> Option<&EntityQueryType> {
        self.entities.get(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityQueryType> {
        self.entities.values()
    }
}

/// Synthesize the query schema for a metamodel
///
/// Pure function of the metamodel and config: deterministic and idempotent.
/// Fails without installing a partial schema if any entity lacks a primary
/// key or any relation targets an unknown entity.
pub fn synthesize(
    metamodel: &Metamodel,
    config: &EngineConfig,
) -> Result<QuerySchema, SchemaBuildError> {
    validate(metamodel)?;

    let depth_cap = config.max_filter_depth.max(1);
    let mut entities = IndexMap::new();

    for entity in metamodel.entities() {
        let mut fields = IndexMap::new();
        let mut sortable = Vec::new();

        for attr in entity.attributes() {
            fields.insert(
                attr.name.clone(),
                FieldType::Scalar {
                    kind: attr.kind,
                    nullable: attr.nullable,
                },
            );
            if attr.sortable {
                sortable.push(attr.name.clone());
            }
        }
        for rel in entity.relations() {
            fields.insert(
                rel.name.clone(),
                FieldType::Relation {
                    target: rel.target.clone(),
                    cardinality: rel.cardinality,
                },
            );
        }

        entities.insert(
            entity.name.clone(),
            EntityQueryType {
                entity: entity.name.clone(),
                fields,
                sortable,
                filter: filter_input(metamodel, entity, 1, depth_cap),
            },
        );
    }

    Ok(QuerySchema { entities })
}

/// Generate the filter-input type for `entity` at recursion level `depth`
///
/// Below the cap, relations expand into full nested filter types; at the cap
/// a relation exposes only a flat identifier filter, which keeps
/// self-referential and mutually-referential entities finite.
fn filter_input(
    metamodel: &Metamodel,
    entity: &EntityDescriptor,
    depth: usize,
    depth_cap: usize,
) -> FilterInputType {
    let mut fields = IndexMap::new();

    for attr in entity.attributes() {
        if !attr.filterable {
            continue;
        }
        fields.insert(
            attr.name.clone(),
            FilterFieldType::Scalar {
                kind: attr.kind,
                ops: operators_for(attr.kind, attr.nullable),
            },
        );
    }

    for rel in entity.relations() {
        // Target presence was checked up front in validate().
        let target = match metamodel.entity(&rel.target) {
            Some(t) => t,
            None => continue,
        };
        let nested = if depth < depth_cap {
            filter_input(metamodel, target, depth + 1, depth_cap)
        } else {
            identifier_filter(target)
        };
        fields.insert(
            rel.name.clone(),
            FilterFieldType::Relation {
                target: rel.target.clone(),
                nested,
            },
        );
    }

    FilterInputType { fields }
}

/// The flat filter exposed beyond the recursion cap: primary key only
fn identifier_filter(entity: &EntityDescriptor) -> FilterInputType {
    let mut fields = IndexMap::new();
    let pk = entity.pk();
    if let Some(attr) = entity.attribute(pk) {
        fields.insert(
            attr.name.clone(),
            FilterFieldType::Scalar {
                kind: attr.kind,
                ops: operators_for(attr.kind, attr.nullable),
            },
        );
    }
    FilterInputType { fields }
}

fn validate(metamodel: &Metamodel) -> Result<(), SchemaBuildError> {
    for entity in metamodel.entities() {
        let pk = entity
            .primary_key
            .as_deref()
            .ok_or_else(|| SchemaBuildError::MissingPrimaryKey(entity.name.clone()))?;
        if entity.attribute(pk).is_none() {
            return Err(SchemaBuildError::UnknownPrimaryKey {
                entity: entity.name.clone(),
                attribute: pk.to_string(),
            });
        }
        for rel in entity.relations() {
            if metamodel.entity(&rel.target).is_none() {
                return Err(SchemaBuildError::UnknownRelationTarget {
                    entity: entity.name.clone(),
                    relation: rel.name.clone(),
                    target: rel.target.clone(),
                });
            }
            if entity.attribute(&rel.name).is_some() {
                return Err(SchemaBuildError::RelationShadowsAttribute {
                    entity: entity.name.clone(),
                    relation: rel.name.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::metamodel::AttributeDescriptor;

    fn library_metamodel() -> Metamodel {
        Metamodel::builder()
            .entity("Books", "books", |e| {
                e.primary_key("id")
                    .attribute(AttributeDescriptor::new("id", ScalarKind::Id))
                    .attribute(AttributeDescriptor::new("title", ScalarKind::Text))
                    .attribute(AttributeDescriptor::new("genre", ScalarKind::Enum).nullable())
                    .to_one("author", "Authors", "author_id")
            })
            .entity("Authors", "authors", |e| {
                e.primary_key("id")
                    .attribute(AttributeDescriptor::new("id", ScalarKind::Id))
                    .attribute(AttributeDescriptor::new("name", ScalarKind::Text))
                    .to_many("books", "Books", "author_id")
            })
            .build()
    }

    #[test]
    fn one_query_type_and_one_filter_type_per_entity() {
        let schema = synthesize(&library_metamodel(), &EngineConfig::default()).unwrap();
        assert_eq!(schema.entities().count(), 2);

        let books = schema.entity("Books").unwrap();
        assert_matches!(books.field("title"), Some(FieldType::Scalar { .. }));
        assert_matches!(
            books.field("author"),
            Some(FieldType::Relation {
                cardinality: Cardinality::ToOne,
                ..
            })
        );
        assert_matches!(books.filter.field("title"), Some(FilterFieldType::Scalar { .. }));
        assert_matches!(books.filter.field("author"), Some(FilterFieldType::Relation { .. }));
    }

    #[test]
    fn synthesis_is_deterministic() {
        let metamodel = library_metamodel();
        let config = EngineConfig::default();
        let a = synthesize(&metamodel, &config).unwrap();
        let b = synthesize(&metamodel, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn recursive_filters_collapse_to_identifier_at_depth_cap() {
        let config = EngineConfig {
            max_filter_depth: 2,
            ..EngineConfig::default()
        };
        let schema = synthesize(&library_metamodel(), &config).unwrap();

        // Books -> author (depth 2) -> books collapses to the id-only filter.
        let books = schema.entity("Books").unwrap();
        let author = match books.filter.field("author") {
            Some(FilterFieldType::Relation { nested, .. }) => nested,
            other => panic!("expected relation filter, got {other:?}"),
        };
        let nested_books = match author.field("books") {
            Some(FilterFieldType::Relation { nested, .. }) => nested,
            other => panic!("expected relation filter, got {other:?}"),
        };
        assert_eq!(nested_books.fields.len(), 1);
        assert_matches!(nested_books.field("id"), Some(FilterFieldType::Scalar { .. }));
    }

    #[test]
    fn missing_primary_key_is_a_build_error() {
        let metamodel = Metamodel::builder()
            .entity("Orphans", "orphans", |e| {
                e.attribute(AttributeDescriptor::new("name", ScalarKind::Text))
            })
            .build();
        assert_matches!(
            synthesize(&metamodel, &EngineConfig::default()),
            Err(SchemaBuildError::MissingPrimaryKey(name)) if name == "Orphans"
        );
    }

    #[test]
    fn unknown_relation_target_is_a_build_error() {
        let metamodel = Metamodel::builder()
            .entity("Books", "books", |e| {
                e.primary_key("id")
                    .attribute(AttributeDescriptor::new("id", ScalarKind::Id))
                    .to_one("author", "Ghosts", "author_id")
            })
            .build();
        assert_matches!(
            synthesize(&metamodel, &EngineConfig::default()),
            Err(SchemaBuildError::UnknownRelationTarget { target, .. }) if target == "Ghosts"
        );
    }
}
