pub mod articles;
pub mod config;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod preferences;
pub mod providers;
pub mod query;
