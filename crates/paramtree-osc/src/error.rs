//! OSC endpoint errors

use paramtree_core::ParameterError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OscError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid socket address: {0}")]
    InvalidAddress(String),

    #[error("No remote peer to send to")]
    NoTarget,

    #[error("Malformed OSC packet: {0}")]
    Decode(String),

    #[error("Failed to encode OSC packet: {0}")]
    Encode(String),

    #[error("No node at {0}")]
    PathNotFound(String),

    #[error("Node {0} has no parameter")]
    NoParameter(String),

    #[error("Unsupported arguments for {0}")]
    UnsupportedArguments(String),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
