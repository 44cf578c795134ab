//! Core types and trait definitions for the hecho ETL pipeline.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! source client, the SQLite gateway and the loaders all depend on it.

pub mod audit;
pub mod calendar;
pub mod dataset;
pub mod error;
pub mod record;
pub mod schedule;
pub mod settings;
pub mod source;

pub use error::{Error, Result};
