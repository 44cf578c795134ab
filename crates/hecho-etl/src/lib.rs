//! The two ETL stages and the operational checks built on their audit logs.
//!
//! - [`LakeLoader`] pulls from a [`RecordSource`](hecho_core::source::RecordSource)
//!   into the raw lake tables.
//! - [`WarehouseLoader`] reads the lake and maintains the star schema.
//! - [`health`] and [`catchup`] read back what the loaders recorded.

mod lake;
mod sql;
mod warehouse;

pub mod catchup;
pub mod error;
pub mod health;

pub use error::{Error, Result};
pub use lake::{LakeLoader, LakeSummary};
pub use warehouse::{WarehouseLoader, WarehouseSummary};

#[cfg(test)]
mod tests;
