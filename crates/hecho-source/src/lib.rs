//! HTTP client for the Socrata (SODA) open-data API.
//!
//! [`SodaClient`] implements [`hecho_core::source::RecordSource`]; transient
//! HTTP failures are retried here so the loaders only ever see final errors.

mod client;
mod retry;

pub mod error;

pub use client::{SodaClient, soql_where};
pub use error::{Error, Result};
pub use retry::RetryPolicy;
