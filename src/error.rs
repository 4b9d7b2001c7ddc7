use thiserror::Error;

use crate::status::{DecodeError, RemoteError};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of a single transport call to one address.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("Invalid address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: BoxError,
    },

    #[error("Join RPC to {addr} failed: {status}")]
    Rpc { addr: String, status: tonic::Status },
}

impl CallError {
    pub fn addr(&self) -> &str {
        match self {
            CallError::InvalidAddress { addr, .. }
            | CallError::Connect { addr, .. }
            | CallError::Rpc { addr, .. } => addr,
        }
    }
}

/// Why one seed address (and the redirect chain behind it) did not accept the join.
#[derive(Error, Debug)]
pub enum JoinError {
    #[error(transparent)]
    Call(#[from] CallError),

    #[error("Malformed error status from {addr}: {source}")]
    Decode {
        addr: String,
        #[source]
        source: DecodeError,
    },

    #[error("Join rejected by {addr}: {error}")]
    Rejected { addr: String, error: RemoteError },

    #[error("Not found leader: {addr} is not the leader and does not know who is")]
    LeaderNotFound { addr: String },

    #[error("Deadline exceeded before join reached {addr}")]
    DeadlineExceeded { addr: String },

    #[error("Gave up at {addr} after following {hops} leader redirects")]
    TooManyRedirects { addr: String, hops: usize },
}

/// Every round failed for every seed. Bootstrapping cannot continue without
/// cluster membership, so callers treat this as fatal.
#[derive(Error, Debug)]
#[error("Failed to join cluster at {addrs:?} after {attempts} attempts")]
pub struct JoinExhausted {
    pub addrs: Vec<String>,
    pub attempts: u32,
    #[source]
    pub last_error: Option<JoinError>,
}
