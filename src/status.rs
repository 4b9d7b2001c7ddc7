//! Structured errors carried in gRPC trailer metadata.
//!
//! A store node that refuses a request answers with an ordinary gRPC status
//! and, next to it, an `x-store-error-bin` trailer holding a protobuf
//! [`ErrorStatus`]: an application error code plus typed detail payloads.
//! The only detail this crate interprets is [`LeaderHint`], attached by
//! followers to `ERR_CODE_NOT_LEADER` so the caller can retry against the
//! leader directly.

use std::fmt;

use prost::Message;
use prost_types::Any;
use tonic::metadata::errors::InvalidMetadataValueBytes;
use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::{Code, Status};

use crate::proto::{ErrCode, ErrorStatus, LeaderHint};

/// Binary trailer key holding the encoded [`ErrorStatus`].
pub const ERROR_TRAILER_KEY: &str = "x-store-error-bin";

/// Type URL of a packed [`LeaderHint`] detail.
pub const LEADER_HINT_TYPE_URL: &str = "type.googleapis.com/store.LeaderHint";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("error trailer is not valid binary metadata: {0}")]
    Trailer(#[from] InvalidMetadataValueBytes),

    #[error("failed to decode {message}: {source}")]
    Protobuf {
        message: &'static str,
        #[source]
        source: prost::DecodeError,
    },

    #[error("unexpected detail type {found:?}, expected {expected:?}")]
    UnexpectedType {
        expected: &'static str,
        found: String,
    },
}

/// Application-level error returned by a peer.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    pub code: i32,
    pub message: String,
    pub details: Vec<Any>,
}

impl RemoteError {
    pub fn new(code: ErrCode, message: impl Into<String>) -> Self {
        Self {
            code: code as i32,
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// The error a follower returns. `leader` is `None` while no leader is known,
    /// which is sent as a hint with an empty address.
    pub fn not_leader(leader: Option<&str>) -> Self {
        let message = match leader {
            Some(addr) => format!("Not the leader. Redirect to {}", addr),
            None => "Not the leader. Leader unknown, retry later".to_string(),
        };
        Self::new(ErrCode::NotLeader, message)
            .with_detail(pack_leader_hint(leader.unwrap_or_default()))
    }

    pub fn with_detail(mut self, detail: Any) -> Self {
        self.details.push(detail);
        self
    }

    /// `None` for codes this build does not know about.
    pub fn kind(&self) -> Option<ErrCode> {
        ErrCode::try_from(self.code).ok()
    }

    pub fn is_not_leader(&self) -> bool {
        self.kind() == Some(ErrCode::NotLeader)
    }

    /// Decode the first detail as a leader hint. `None` when there are no details.
    pub fn leader_hint(&self) -> Option<Result<LeaderHint, DecodeError>> {
        self.details.first().map(unpack_leader_hint)
    }

    /// Extract the structured error from a failed call.
    ///
    /// Returns `Ok(None)` for statuses that carry no error trailer, e.g.
    /// transport-level failures or peers that do not speak this protocol.
    pub fn from_status(status: &Status) -> Result<Option<Self>, DecodeError> {
        let Some(value) = status.metadata().get_bin(ERROR_TRAILER_KEY) else {
            return Ok(None);
        };
        let bytes = value.to_bytes()?;
        let decoded =
            ErrorStatus::decode(bytes.as_ref()).map_err(|source| DecodeError::Protobuf {
                message: "ErrorStatus",
                source,
            })?;

        Ok(Some(Self {
            code: decoded.code,
            message: decoded.message,
            details: decoded.details,
        }))
    }

    /// Encode into a gRPC status with the error trailer attached.
    pub fn into_status(self) -> Status {
        let code = grpc_code(self.kind());
        let message = self.message.clone();
        let encoded = ErrorStatus {
            code: self.code,
            message: self.message,
            details: self.details,
        }
        .encode_to_vec();

        let mut metadata = MetadataMap::new();
        metadata.insert_bin(ERROR_TRAILER_KEY, MetadataValue::from_bytes(&encoded));
        Status::with_metadata(code, message, metadata)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "{}: {}", kind.as_str_name(), self.message),
            None => write!(f, "error code {}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

fn grpc_code(kind: Option<ErrCode>) -> Code {
    match kind {
        Some(ErrCode::NotLeader) => Code::FailedPrecondition,
        Some(ErrCode::InvalidArgument) => Code::InvalidArgument,
        Some(ErrCode::AlreadyMember) => Code::AlreadyExists,
        Some(ErrCode::Internal) | Some(ErrCode::Unspecified) | None => Code::Internal,
    }
}

pub fn pack_leader_hint(addr: &str) -> Any {
    Any {
        type_url: LEADER_HINT_TYPE_URL.to_string(),
        value: LeaderHint {
            addr: addr.to_string(),
        }
        .encode_to_vec(),
    }
}

pub fn unpack_leader_hint(detail: &Any) -> Result<LeaderHint, DecodeError> {
    if detail.type_url != LEADER_HINT_TYPE_URL {
        return Err(DecodeError::UnexpectedType {
            expected: LEADER_HINT_TYPE_URL,
            found: detail.type_url.clone(),
        });
    }
    LeaderHint::decode(detail.value.as_slice()).map_err(|source| DecodeError::Protobuf {
        message: "LeaderHint",
        source,
    })
}
