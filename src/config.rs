//! Engine configuration

use std::env;

use anyhow::{Context, Result};

/// Default recursion depth for generated filter-input types
const DEFAULT_FILTER_DEPTH: usize = 3;

/// Tunables for schema synthesis and translation
///
/// A default instance is fine for most deployments; `from_env` mirrors the
/// usual twelve-factor setup for services embedding the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How deep nested relation filters may recurse before collapsing to a
    /// flat identifier filter. Guards mutually-referential entities against
    /// unbounded type generation.
    pub max_filter_depth: usize,

    /// Emit the rendered SQL of every translated query at debug level
    pub log_sql: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_filter_depth: DEFAULT_FILTER_DEPTH,
            log_sql: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let max_filter_depth = match env::var("RELATIONQL_FILTER_DEPTH") {
            Ok(s) => s
                .parse()
                .context("RELATIONQL_FILTER_DEPTH must be a positive integer")?,
            Err(_) => DEFAULT_FILTER_DEPTH,
        };

        let log_sql = env::var("RELATIONQL_LOG_SQL")
            .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            max_filter_depth,
            log_sql,
        })
    }
}
