//! Engine error taxonomy
//!
//! Three failure classes with distinct lifecycles:
//! - [`SchemaBuildError`]: fatal at startup, no partial schema is installed
//! - [`TranslateError`]: per-request, detected before any SQL is issued
//! - [`EngineError`]: the request-level umbrella, including store failures

use serde::Serialize;
use thiserror::Error;

/// Metamodel problems detected during schema synthesis
#[derive(Debug, Error)]
pub enum SchemaBuildError {
    /// Every entity must declare a primary key before it can be queried
    #[error("entity `{0}` has no primary key")]
    MissingPrimaryKey(String),

    /// The declared primary key must be one of the entity's attributes
    #[error("primary key `{attribute}` of entity `{entity}` is not a declared attribute")]
    UnknownPrimaryKey { entity: String, attribute: String },

    /// A relation pointing at an entity the metamodel does not contain
    #[error("relation `{entity}.{relation}` targets unknown entity `{target}`")]
    UnknownRelationTarget {
        entity: String,
        relation: String,
        target: String,
    },

    /// A relation whose name collides with an attribute of the same entity
    #[error("relation `{relation}` of entity `{entity}` shadows an attribute of the same name")]
    RelationShadowsAttribute { entity: String, relation: String },
}

/// Request-level translation failures
///
/// All of these are raised while converting the parsed document into a
/// query plan; none of them have side effects on the store.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// A selection or filter referenced a field the schema does not expose
    #[error("unknown field `{field}` on `{parent}`")]
    UnknownField { parent: String, field: String },

    /// A structurally valid field used with a malformed argument
    #[error("invalid argument for `{field}`: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// Both offset-style and cursor-style paging were supplied at once
    #[error("ambiguous paging: both offset and cursor supplied")]
    AmbiguousPaging,
}

impl TranslateError {
    pub(crate) fn unknown_field(parent: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            parent: parent.into(),
            field: field.into(),
        }
    }

    pub(crate) fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Umbrella error for a single `execute` call
#[derive(Debug, Error)]
pub enum EngineError {
    /// The document text did not parse or used unsupported constructs
    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Translate(#[from] TranslateError),

    /// Native store failure during the single execution call, no retry
    #[error("execution failed: {0}")]
    Execution(#[from] sqlx::Error),
}

/// Caller-visible error entry, GraphQL response style
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDescriptor {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
}

impl ErrorDescriptor {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Vec::new(),
        }
    }

    pub fn at(message: impl Into<String>, path: Vec<String>) -> Self {
        Self {
            message: message.into(),
            path,
        }
    }
}
