//! OSCQuery endpoint errors

use paramtree_osc::OscError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OscQueryError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid socket address: {0}")]
    InvalidAddress(String),

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("OSC server error: {0}")]
    Osc(#[from] OscError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
