//! Database module: row models and SQL repositories.
//!
//! - `model`: row types and view models returned by repositories.
//! - `repo`: pool setup plus sources, categories, articles and users.
//! - `preferences`: per-user preferred sources, categories and authors.
//!
//! Callers import from `news_aggregator::db`; the repository API is
//! re-exported here.

pub mod model;
pub mod preferences;
pub mod repo;

pub use preferences::*;
pub use repo::*;

pub use model::SaveSummary;
