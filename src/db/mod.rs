//! Storage module for statustrail.
//!
//! Holds the data model, the in-memory history and its SQLite cache.

mod history;
mod models;
mod store;

pub use history::*;
pub use models::*;
pub use store::*;
