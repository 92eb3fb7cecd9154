//! Entity/relationship metamodel read layer
//!
//! The metamodel is supplied by an external mapping layer and describes the
//! storable record types: entities, their scalar attributes, and the
//! associations between them. It is populated once through [`MetamodelBuilder`]
//! and read-only afterwards; the engine never mutates it.

use indexmap::IndexMap;

/// Scalar kind of an attribute, driving operator sets, value coercion and
/// row decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// Primary/foreign key values, integer or text in the store
    Id,
    Text,
    Int,
    Float,
    Bool,
    /// ISO-8601 date or datetime, stored as text
    Date,
    /// Closed set of named values, stored as text
    Enum,
}

impl ScalarKind {
    /// Whether ordering comparisons (GT/GE/LT/LE, BETWEEN) apply
    pub fn is_ordered(self) -> bool {
        matches!(self, Self::Int | Self::Float | Self::Date)
    }
}

/// One scalar column of an entity
///
/// The attribute name doubles as the SQL column name; the external mapping
/// layer is responsible for supplying names valid in both worlds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub name: String,
    pub kind: ScalarKind,
    pub nullable: bool,
    /// Whether the attribute appears in the generated filter-input type
    pub filterable: bool,
    /// Whether the attribute may be used in `orderBy`
    pub sortable: bool,
}

impl AttributeDescriptor {
    /// A non-null, filterable, sortable attribute
    pub fn new(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            filterable: true,
            sortable: true,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn not_filterable(mut self) -> Self {
        self.filterable = false;
        self
    }

    pub fn not_sortable(mut self) -> Self {
        self.sortable = false;
        self
    }
}

/// Association cardinality, as seen from the owning entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// One association of an entity
///
/// The target is referenced by name, not ownership; resolution happens at
/// schema-synthesis time so a dangling target is a build error rather than a
/// runtime one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub name: String,
    pub target: String,
    pub cardinality: Cardinality,
    /// For to-one: the foreign-key column on the owning table referencing the
    /// target's primary key. For to-many: the foreign-key column on the
    /// target table referencing the owning entity's primary key.
    pub fk_column: String,
}

/// One mapped entity: table, attributes, primary key, relations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub name: String,
    pub table: String,
    pub(crate) primary_key: Option<String>,
    attributes: IndexMap<String, AttributeDescriptor>,
    relations: IndexMap<String, RelationDescriptor>,
}

impl EntityDescriptor {
    /// The declared primary-key attribute, if any
    ///
    /// A builder-made entity may not have one; schema synthesis rejects the
    /// metamodel in that case.
    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    /// Primary-key attribute name, for entities that passed synthesis
    pub(crate) fn pk(&self) -> &str {
        self.primary_key
            .as_deref()
            .unwrap_or_else(|| panic!("entity `{}` validated without primary key", self.name))
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.attributes.values()
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.get(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = &RelationDescriptor> {
        self.relations.values()
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.get(name)
    }
}

/// The whole registry, keyed by entity name in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metamodel {
    entities: IndexMap<String, EntityDescriptor>,
}

impl Metamodel {
    pub fn builder() -> MetamodelBuilder {
        MetamodelBuilder::default()
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.values()
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entities.get(name)
    }

    pub fn relation(&self, entity: &str, name: &str) -> Option<&RelationDescriptor> {
        self.entities.get(entity).and_then(|e| e.relation(name))
    }
}

/// Declarative construction facade for mapping layers
///
/// ```
/// use relationql::metamodel::{AttributeDescriptor, Metamodel, ScalarKind};
///
/// let metamodel = Metamodel::builder()
///     .entity("Books", "books", |e| {
///         e.primary_key("id")
///             .attribute(AttributeDescriptor::new("id", ScalarKind::Id))
///             .attribute(AttributeDescriptor::new("title", ScalarKind::Text))
///             .to_one("author", "Authors", "author_id")
///     })
///     .entity("Authors", "authors", |e| {
///         e.primary_key("id")
///             .attribute(AttributeDescriptor::new("id", ScalarKind::Id))
///             .attribute(AttributeDescriptor::new("name", ScalarKind::Text))
///             .to_many("books", "Books", "author_id")
///     })
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct MetamodelBuilder {
    entities: IndexMap<String, EntityDescriptor>,
}

impl MetamodelBuilder {
    /// Declare an entity mapped onto `table`
    ///
    /// Re-declaring an entity name replaces the previous declaration.
    pub fn entity(
        mut self,
        name: impl Into<String>,
        table: impl Into<String>,
        f: impl FnOnce(EntityBuilder) -> EntityBuilder,
    ) -> Self {
        let name = name.into();
        let builder = EntityBuilder {
            descriptor: EntityDescriptor {
                name: name.clone(),
                table: table.into(),
                primary_key: None,
                attributes: IndexMap::new(),
                relations: IndexMap::new(),
            },
        };
        let built = f(builder);
        self.entities.insert(name, built.descriptor);
        self
    }

    /// Freeze the registry
    ///
    /// Structural validation (primary keys, relation targets) is deferred to
    /// schema synthesis so all problems surface through one error channel.
    pub fn build(self) -> Metamodel {
        Metamodel {
            entities: self.entities,
        }
    }
}

/// Builder for a single entity declaration
#[derive(Debug)]
pub struct EntityBuilder {
    descriptor: EntityDescriptor,
}

impl EntityBuilder {
    pub fn primary_key(mut self, attribute: impl Into<String>) -> Self {
        self.descriptor.primary_key = Some(attribute.into());
        self
    }

    pub fn attribute(mut self, attribute: AttributeDescriptor) -> Self {
        self.descriptor
            .attributes
            .insert(attribute.name.clone(), attribute);
        self
    }

    /// A to-one association; `fk_column` lives on this entity's table
    pub fn to_one(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        fk_column: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.descriptor.relations.insert(
            name.clone(),
            RelationDescriptor {
                name,
                target: target.into(),
                cardinality: Cardinality::ToOne,
                fk_column: fk_column.into(),
            },
        );
        self
    }

    /// A to-many association; `fk_column` lives on the target's table
    pub fn to_many(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        fk_column: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.descriptor.relations.insert(
            name.clone(),
            RelationDescriptor {
                name,
                target: target.into(),
                cardinality: Cardinality::ToMany,
                fk_column: fk_column.into(),
            },
        );
        self
    }
}
