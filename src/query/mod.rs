//! Query translation
//!
//! Turns one parsed document root into a single SQL statement: argument and
//! selection validation against the synthesized schema, join planning,
//! predicate construction, and rendering.

pub mod document;
pub mod page;
pub mod plan;
pub mod predicate;
pub mod sql;
pub mod translate;
pub mod values;
