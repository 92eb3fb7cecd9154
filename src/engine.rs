//! Execution facade
//!
//! [`Engine`] ties the pipeline together: schema synthesis at construction,
//! then per-request parse, translate, execute, and assemble. Every root field
//! in a document is translated before any SQL is issued, so a translation
//! failure never leaves the store touched. Each root then executes as exactly
//! one statement on the caller's connection.

use std::sync::Arc;

use async_graphql::{Name, Value, Variables};
use indexmap::IndexMap;
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::config::EngineConfig;
use crate::error::{EngineError, ErrorDescriptor, SchemaBuildError};
use crate::metamodel::Metamodel;
use crate::query::document::parse_document;
use crate::query::plan::QueryPlan;
use crate::query::sql::render;
use crate::query::translate::translate;
use crate::query::values::SqlValue;
use crate::result::{assemble, decode_rows};
use crate::schema::{synthesize, QuerySchema};

/// GraphQL-style response: data on success, errors otherwise, never both
#[derive(Debug, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorDescriptor>,
}

impl Response {
    fn data(value: Value) -> Self {
        Self {
            data: Some(value),
            errors: Vec::new(),
        }
    }

    fn error(error: &EngineError, path: Vec<String>) -> Self {
        Self {
            data: None,
            errors: vec![ErrorDescriptor::at(error.to_string(), path)],
        }
    }
}

/// Query translation engine over one metamodel
///
/// Construction synthesizes the query schema once; after that the engine is
/// immutable and can be shared freely across tasks.
#[derive(Clone)]
pub struct Engine {
    metamodel: Arc<Metamodel>,
    schema: Arc<QuerySchema>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(metamodel: Metamodel, config: EngineConfig) -> Result<Self, SchemaBuildError> {
        let schema = synthesize(&metamodel, &config)?;
        tracing::info!(
            entities = schema.entities().count(),
            "query schema synthesized"
        );
        Ok(Self {
            metamodel: Arc::new(metamodel),
            schema: Arc::new(schema),
            config,
        })
    }

    pub fn schema(&self) -> &QuerySchema {
        &self.schema
    }

    pub fn metamodel(&self) -> &Metamodel {
        &self.metamodel
    }

    /// Execute a query document against the caller's connection
    ///
    /// The response mirrors GraphQL conventions: either a `data` object with
    /// one envelope per root field, or an `errors` list. Failures are
    /// returned in-band rather than raised.
    pub async fn execute(
        &self,
        document: &str,
        variables: &Variables,
        conn: &mut SqliteConnection,
    ) -> Response {
        let roots = match parse_document(document, variables) {
            Ok(roots) => roots,
            Err(e) => {
                tracing::debug!(error = %e, "document rejected");
                return Response::error(&e, Vec::new());
            }
        };

        // Translate every root before issuing any SQL.
        let mut plans: Vec<QueryPlan> = Vec::with_capacity(roots.len());
        for root in &roots {
            match translate(&self.schema, &self.metamodel, root) {
                Ok(plan) => plans.push(plan),
                Err(e) => {
                    tracing::debug!(root = %root.name, error = %e, "translation failed");
                    return Response::error(&e.into(), vec![root.response_key().to_string()]);
                }
            }
        }

        let mut data = IndexMap::new();
        for plan in &plans {
            let (sql, binds) = render(plan);
            if self.config.log_sql {
                tracing::debug!(root = %plan.response_key, sql = %sql, binds = binds.len(), "executing");
            }
            let rows = match fetch(&sql, &binds, &mut *conn).await {
                Ok(rows) => rows,
                Err(e) => {
                    let e = EngineError::from(e);
                    tracing::warn!(root = %plan.response_key, error = %e, "statement failed");
                    return Response::error(&e, vec![plan.response_key.clone()]);
                }
            };
            let decoded = match decode_rows(&rows, plan) {
                Ok(decoded) => decoded,
                Err(e) => {
                    let e = EngineError::from(e);
                    tracing::warn!(root = %plan.response_key, error = %e, "row decode failed");
                    return Response::error(&e, vec![plan.response_key.clone()]);
                }
            };
            data.insert(Name::new(&plan.response_key), assemble(&decoded, plan));
        }
        Response::data(Value::Object(data))
    }
}

async fn fetch(
    sql: &str,
    binds: &[SqlValue],
    conn: &mut SqliteConnection,
) -> Result<Vec<sqlx::sqlite::SqliteRow>, sqlx::Error> {
    let mut query = sqlx::query(sql);
    for bind in binds {
        query = match bind {
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Int(n) => query.bind(*n),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Null => query.bind(Option::<i64>::None),
        };
    }
    query.fetch_all(conn).await
}
