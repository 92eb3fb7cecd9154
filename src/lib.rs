//! relationql: translate GraphQL query documents into single relational
//! statements.
//!
//! The engine is built from a [`metamodel::Metamodel`] describing entities,
//! attributes, and relations over an existing relational schema. From that it
//! synthesizes a query schema with per-entity filter and sort inputs, then
//! executes each incoming document root as exactly one SQL statement: joins
//! for every selected or filtered relation, a predicate tree from the `where`
//! argument, paging, and an optional total-count subquery. The flat result
//! rows are regrouped into the nested envelope shape the caller selected.
//!
//! ```no_run
//! use relationql::{AttributeDescriptor, Engine, EngineConfig, Metamodel, ScalarKind};
//! # async fn demo(conn: &mut sqlx::SqliteConnection) -> anyhow::Result<()> {
//! let metamodel = Metamodel::builder()
//!     .entity("Books", "books", |e| {
//!         e.primary_key("id")
//!             .attribute(AttributeDescriptor::new("id", ScalarKind::Id))
//!             .attribute(AttributeDescriptor::new("title", ScalarKind::Text))
//!             .to_many("reviews", "Reviews", "book_id")
//!     })
//!     .entity("Reviews", "reviews", |e| {
//!         e.primary_key("id")
//!             .attribute(AttributeDescriptor::new("id", ScalarKind::Id))
//!             .attribute(AttributeDescriptor::new("stars", ScalarKind::Int))
//!     })
//!     .build();
//!
//! let engine = Engine::new(metamodel, EngineConfig::default())?;
//! let response = engine
//!     .execute(
//!         r#"query { Books { select { title reviews { stars } } total } }"#,
//!         &Default::default(),
//!         conn,
//!     )
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod metamodel;
pub mod query;
pub mod result;
pub mod schema;

pub use config::EngineConfig;
pub use engine::{Engine, Response};
pub use error::{EngineError, ErrorDescriptor, SchemaBuildError, TranslateError};
pub use metamodel::{
    AttributeDescriptor, Cardinality, EntityDescriptor, Metamodel, RelationDescriptor, ScalarKind,
};
pub use schema::QuerySchema;
