//! Destination table layout.
//!
//! Every mapped topic lands in a table of the same fixed shape:
//!
//! ```text
//! raw_data            String                  unmodified source payload
//! _ingest_timestamp   DateTime DEFAULT now()  arrival time at the bridge
//! _source_offset      UInt64
//! _source_partition   UInt32
//! ```

use cdc_bridge_core::StoredRecord;
use clickhouse::Row;
use serde::Serialize;

pub const COLUMNS: [&str; 4] = [
    "raw_data",
    "_ingest_timestamp",
    "_source_offset",
    "_source_partition",
];

/// Row struct for the CDC tables - used for type-safe inserts.
/// `_ingest_timestamp` is Unix seconds (u32), which is how ClickHouse
/// `DateTime` is represented in RowBinary.
#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize)]
pub struct CdcRow {
    pub raw_data: String,
    pub _ingest_timestamp: u32,
    pub _source_offset: u64,
    pub _source_partition: u32,
}

impl From<&StoredRecord> for CdcRow {
    fn from(record: &StoredRecord) -> Self {
        Self {
            raw_data: record.raw_payload.clone(),
            // DateTime cannot hold anything before 1970 or after 2106
            _ingest_timestamp: record.ingested_at.timestamp().clamp(0, u32::MAX as i64) as u32,
            _source_offset: record.source_offset,
            _source_partition: record.source_partition,
        }
    }
}

/// `CREATE TABLE IF NOT EXISTS` for one destination table.
pub fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
    raw_data String,
    _ingest_timestamp DateTime DEFAULT now(),
    _source_offset UInt64,
    _source_partition UInt32
) ENGINE = MergeTree()
ORDER BY _ingest_timestamp"
    )
}

pub fn truncate_table_sql(table: &str) -> String {
    format!("TRUNCATE TABLE IF EXISTS {table}")
}

pub fn count_rows_sql(table: &str) -> String {
    format!("SELECT count() FROM {table}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_create_table_is_idempotent_ddl() {
        let sql = create_table_sql("mongo_ecom_orders");
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS mongo_ecom_orders ("));
        for column in COLUMNS {
            assert!(sql.contains(column), "missing column {column}");
        }
        assert!(sql.contains("_ingest_timestamp DateTime DEFAULT now()"));
        assert!(sql.contains("ENGINE = MergeTree()"));
        // `?` is a bind placeholder for the client and must never appear
        assert!(!sql.contains('?'));
    }

    #[test]
    fn test_row_from_record() {
        let record = StoredRecord {
            raw_payload: "{\"_id\": 1}".to_string(),
            ingested_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            source_offset: 42,
            source_partition: 3,
        };
        let row = CdcRow::from(&record);
        assert_eq!(row.raw_data, "{\"_id\": 1}");
        assert_eq!(row._ingest_timestamp, 1_704_067_200);
        assert_eq!(row._source_offset, 42);
        assert_eq!(row._source_partition, 3);
    }

    #[test]
    fn test_pre_epoch_timestamp_is_clamped() {
        let record = StoredRecord {
            raw_payload: "{}".to_string(),
            ingested_at: Utc.with_ymd_and_hms(1960, 1, 1, 0, 0, 0).unwrap(),
            source_offset: 0,
            source_partition: 0,
        };
        assert_eq!(CdcRow::from(&record)._ingest_timestamp, 0);
    }

    #[test]
    fn test_admin_statements() {
        assert_eq!(
            truncate_table_sql("mongo_ecom_orders"),
            "TRUNCATE TABLE IF EXISTS mongo_ecom_orders"
        );
        assert_eq!(
            count_rows_sql("mongo_ecom_orders"),
            "SELECT count() FROM mongo_ecom_orders"
        );
    }
}
