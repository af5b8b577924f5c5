//! Error taxonomy for control-interface operations.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use wpactrl_config::ConfigError;

/// How a command/reply exchange went wrong.
///
/// Shared by `request`, `attach` and `detach`, which all send one datagram
/// and wait for one reply.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The send or receive failed, or the daemon refused the command.
    #[error("failed: {0}")]
    Failed(#[source] io::Error),

    /// No reply arrived within the configured window.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Anything else, e.g. the socket reader stopped without answering.
    #[error("returned unknown error: {0}")]
    Unknown(String),
}

/// Errors from a [`ControlConnection`](crate::ControlConnection).
#[derive(Debug, thiserror::Error)]
pub enum WpaCtrlError {
    #[error("invalid connection config: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to open control interface at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("request {0}")]
    Request(ExchangeError),

    #[error("attach {0}")]
    Attach(ExchangeError),

    #[error("detach {0}")]
    Detach(ExchangeError),

    #[error("pending check failed: {0}")]
    Pending(#[source] io::Error),

    #[error("receive failed: {0}")]
    Recv(#[source] io::Error),

    #[error("connection is closed")]
    Closed,
}

impl WpaCtrlError {
    /// The exchange classification, for request/attach/detach failures.
    pub fn exchange(&self) -> Option<&ExchangeError> {
        match self {
            Self::Request(e) | Self::Attach(e) | Self::Detach(e) => Some(e),
            _ => None,
        }
    }

    /// Whether this is a request/attach/detach timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self.exchange(), Some(ExchangeError::Timeout(_)))
    }
}
