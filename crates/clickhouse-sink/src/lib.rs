//! ClickHouse destination for cdc-bridge.
//!
//! [`ClickHouseSink`] implements [`cdc_bridge_core::RecordSink`] over the
//! ClickHouse HTTP interface. Tables are created on demand with a fixed
//! raw-payload layout (see [`schema`]), and every batch is written as one
//! `INSERT`.

pub mod error;
pub mod schema;
pub mod sink;

pub use error::{Error, Result};
pub use schema::{create_table_sql, CdcRow};
pub use sink::{ClickHouseConfig, ClickHouseSink};
