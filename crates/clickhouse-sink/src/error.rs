use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("ClickHouse error: {0}")]
    ClickHouse(#[from] clickhouse::error::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Refusing to use table name {0:?}")]
    InvalidTable(String),
}

pub type Result<T> = std::result::Result<T, Error>;
