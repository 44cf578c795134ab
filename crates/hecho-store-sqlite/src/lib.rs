//! SQLite backend for the hecho lake and warehouse stores.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on dedicated
//! connection threads without blocking the async runtime. A [`Gateway`] owns
//! a small bounded pool of such connections and bootstraps one of the two
//! [`Schema`]s on open.

mod gateway;
mod pool;
mod schema;

pub mod encode;
pub mod error;

pub use error::{Error, Result};
pub use gateway::Gateway;
pub use rusqlite;
pub use rusqlite::types::Value;
pub use schema::Schema;

#[cfg(test)]
mod tests;
