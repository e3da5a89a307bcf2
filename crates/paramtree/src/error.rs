//! Errors raised while exposing a device

use paramtree_osc::OscError;
use paramtree_oscquery::OscQueryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExposeError {
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("OSC endpoint failed: {0}")]
    Osc(#[from] OscError),

    #[error("OSCQuery endpoint failed: {0}")]
    OscQuery(#[from] OscQueryError),
}
