//! Domain layer for venue management: records, drafts, list queries and statistics.

pub mod draft;
pub mod query;
pub mod relations;
pub mod stats;
pub mod types;
