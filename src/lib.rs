pub mod cache;
pub mod composition;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod filter;
pub mod lookup;
pub mod query;
pub mod reduce;
pub mod traversal;

pub use config::Config;
pub use db::Db;
pub use engine::QueryEngine;
pub use error::{Result, UbkgError};
pub use filter::FilterSpec;
pub use traversal::{Direction, PathStep, TraversalMode, TraversalRequest};
