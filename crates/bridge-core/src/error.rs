use thiserror::Error;

/// Fatal errors. Anything that can go wrong for a single message or a single
/// batch is handled inside the driver loop and never surfaces here.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Broker unreachable: {0:#}")]
    BrokerUnavailable(anyhow::Error),

    #[error("Sink unreachable: {0:#}")]
    SinkUnavailable(anyhow::Error),

    #[error("Failed to create table {table}: {reason:#}")]
    TableProvisioning {
        table: String,
        reason: anyhow::Error,
    },

    #[error("Failed to clear table {table}: {reason:#}")]
    TableTruncation {
        table: String,
        reason: anyhow::Error,
    },

    #[error("Failed to subscribe to topics: {0:#}")]
    Subscribe(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
