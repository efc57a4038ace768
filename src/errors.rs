//! Live Engine Error Hierarchy
//!
//! Every failure is classified into one of five kinds (see [`ErrorKind`]).
//! The kind decides the status a subscriber is told and whether a caller
//! may retry; the concrete variant keeps the context for logs.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

use crate::NodeId;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by handlers, the stream manager and the leader path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown channel, namespace or path. Never retried.
    NotFound,
    /// Authorization failed. Never retried.
    PermissionDenied,
    /// Backend, transport or store failure. Retry at the caller's discretion.
    Internal,
    /// Stream submission exceeded its bound. Retryable.
    Timeout,
    /// Malformed local input. Never retried.
    Validation,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed channel address or request payload
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The stream manager did not acknowledge a submission in time
    #[error("Stream submission for {key} timed out after {duration:?}")]
    SubmitTimeout { key: String, duration: Duration },

    /// Infrastructure-level failures (network, storage, plugin backend)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Leader lease and fencing failures
    #[error(transparent)]
    Leader(#[from] LeaderError),

    /// Node configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid channel '{channel}': {reason}")]
    InvalidChannel {
        channel: String,
        reason: &'static str,
    },

    #[error("Invalid notice request: {0}")]
    InvalidNotice(&'static str),

    #[error("Action '{0}' is not supported")]
    Unsupported(&'static str),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Plugin backend reported a failure
    #[error("Plugin {plugin_id} failed: {reason}")]
    Plugin { plugin_id: String, reason: String },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// The stream manager loop is gone (node shutting down)
    #[error("Stream manager stopped")]
    StreamManagerStopped,

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("Node failed to start: {0}")]
    NodeStartFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Sled(#[from] sled::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// No handler registered for the node (or it already shut down)
    #[error("Node {0} unreachable")]
    NodeUnreachable(NodeId),

    #[error("Call to node {node_id} timed out after {duration:?}")]
    Timeout { node_id: NodeId, duration: Duration },

    /// Broadcasting to subscribers failed
    #[error("Publish to {channel} failed: {reason}")]
    Publish { channel: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum LeaderError {
    /// The presented leadership token no longer matches the lease
    #[error("Node {node_id} is not the leader of {key}")]
    NotLeader { key: String, node_id: NodeId },

    /// HA routing was requested without a coordinator
    #[error("No leader coordinator configured")]
    NoCoordinator,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::SubmitTimeout { .. } => ErrorKind::Timeout,
            Error::System(_) | Error::Leader(_) | Error::Config(_) | Error::Fatal(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Internal | ErrorKind::Timeout)
    }

    /// Errors after which a background stream body must not be restarted
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::PermissionDenied(_)
                | Error::Leader(LeaderError::NotLeader { .. })
        )
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::System(SystemError::Network(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}
