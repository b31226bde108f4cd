//! Error types for vision nodes.

use thiserror::Error;

use crate::broker::BrokerError;
use crate::store::StoreError;

/// Errors that abort node startup or the node loop.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Configuration file not found, unreadable or invalid
    #[error("Config error: {0}")]
    Config(String),

    /// Failed to parse configuration YAML
    #[error("Parse error: {0}")]
    Parse(String),

    /// Broker connection or subscription failed
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Image store client could not be built
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Node initialization failed
    #[error("Init error: {0}")]
    Init(String),
}

impl From<serde_yaml::Error> for NodeError {
    fn from(err: serde_yaml::Error) -> Self {
        NodeError::Parse(err.to_string())
    }
}

impl From<ctrlc::Error> for NodeError {
    fn from(err: ctrlc::Error) -> Self {
        NodeError::Init(format!("Failed to install signal handler: {}", err))
    }
}
