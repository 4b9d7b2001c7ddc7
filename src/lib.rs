pub mod config;
pub mod error;
pub mod join;
pub mod status;
pub mod transport;

pub use config::JoinConfig;
pub use error::{CallError, JoinError, JoinExhausted};
pub use join::{join_cluster, ClusterJoiner, JoinRequest, Joined};
pub use transport::{GrpcTransport, JoinTransport};

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("store");
}
