use tokio::time::Instant;
use tonic::transport::Endpoint;

use crate::error::CallError;
use crate::join::JoinRequest;
use crate::proto::store_service_client::StoreServiceClient;

/// One join call against one address.
///
/// Implementations own the connection for the duration of the call and must
/// release it before returning, whatever the outcome. `deadline` is the
/// shared budget of the whole join; the caller has already checked that it
/// has not passed.
#[tonic::async_trait]
pub trait JoinTransport: Send + Sync {
    async fn join(
        &self,
        addr: &str,
        request: &JoinRequest,
        deadline: Instant,
    ) -> Result<(), CallError>;
}

/// Plaintext gRPC transport speaking `store.StoreService/Join`.
#[derive(Debug, Clone, Default)]
pub struct GrpcTransport;

impl GrpcTransport {
    pub fn new() -> Self {
        Self
    }
}

/// Accept both `host:port` and full URIs.
fn endpoint_uri(addr: &str) -> String {
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    }
}

#[tonic::async_trait]
impl JoinTransport for GrpcTransport {
    async fn join(
        &self,
        addr: &str,
        request: &JoinRequest,
        deadline: Instant,
    ) -> Result<(), CallError> {
        let remaining = deadline.saturating_duration_since(Instant::now());

        let endpoint = Endpoint::from_shared(endpoint_uri(addr))
            .map_err(|e| CallError::InvalidAddress {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?
            .connect_timeout(remaining)
            .timeout(remaining);

        let channel = endpoint.connect().await.map_err(|e| CallError::Connect {
            addr: addr.to_string(),
            source: Box::new(e),
        })?;
        tracing::debug!(addr, "Connected to join target");

        // The channel is dropped with the client when this function returns.
        let mut client = StoreServiceClient::new(channel);
        let mut rpc = tonic::Request::new(request.to_proto());
        rpc.set_timeout(remaining);

        client
            .join(rpc)
            .await
            .map(|_| ())
            .map_err(|status| CallError::Rpc {
                addr: addr.to_string(),
                status,
            })
    }
}
