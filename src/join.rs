//! Joining an existing cluster.
//!
//! Only the Raft leader accepts membership changes, and a booting node does
//! not know which peer leads. [`ClusterJoiner`] walks the configured seeds in
//! order, follows `NotLeader` hints until some node accepts the join, and
//! retries the whole seed list a fixed number of times. One deadline, fixed
//! when the join starts, bounds every connection, call and redirect.

use std::collections::HashMap;

use tokio::time::{sleep, timeout_at, Instant};

use crate::config::JoinConfig;
use crate::error::{CallError, JoinError, JoinExhausted};
use crate::proto::NodeJoinRequest;
use crate::status::RemoteError;
use crate::transport::{GrpcTransport, JoinTransport};

/// What a node sends when asking to become a cluster member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    raft_addr: String,
    node_id: String,
    metadata: HashMap<String, String>,
}

impl JoinRequest {
    pub fn new(raft_addr: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            raft_addr: raft_addr.into(),
            node_id: node_id.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn raft_addr(&self) -> &str {
        &self.raft_addr
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn to_proto(&self) -> NodeJoinRequest {
        NodeJoinRequest {
            addr: self.raft_addr.clone(),
            node_id: self.node_id.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    /// Configured address the successful chain started from
    pub seed: String,
    /// Address that accepted the join
    pub leader: String,
    /// 1-based round in which the join succeeded
    pub round: u32,
}

/// Next step after a rejected call.
enum Next {
    Redirect(String),
    Fail(JoinError),
    /// No structured error attached; report the status itself.
    Propagate,
}

pub struct ClusterJoiner<T = GrpcTransport> {
    config: JoinConfig,
    transport: T,
}

impl ClusterJoiner<GrpcTransport> {
    pub fn new(config: JoinConfig) -> Self {
        Self::with_transport(config, GrpcTransport::new())
    }
}

impl<T: JoinTransport> ClusterJoiner<T> {
    pub fn with_transport(config: JoinConfig, transport: T) -> Self {
        Self { config, transport }
    }

    /// Join the cluster, terminating the process if every attempt fails.
    ///
    /// Used during node startup, where running without cluster membership
    /// is not an option.
    pub async fn join_or_exit(&self, request: &JoinRequest) -> Joined {
        match self.try_join(request).await {
            Ok(joined) => joined,
            Err(exhausted) => {
                tracing::error!(
                    addrs = ?exhausted.addrs,
                    attempts = exhausted.attempts,
                    last_error = ?exhausted.last_error.as_ref().map(ToString::to_string),
                    "{}",
                    exhausted
                );
                std::process::exit(1);
            }
        }
    }

    /// Try every configured address for up to `attempts` rounds.
    ///
    /// Rounds are separated by `attempt_interval`. The deadline is computed
    /// once here and never refreshed, so rounds that start after it has
    /// passed fail every address without contacting it.
    pub async fn try_join(&self, request: &JoinRequest) -> Result<Joined, JoinExhausted> {
        let deadline = Instant::now() + self.config.deadline;
        let mut last_error = None;

        for round in 1..=self.config.attempts {
            for seed in &self.config.join_addrs {
                match self.join_once(seed, request, deadline).await {
                    Ok(leader) => {
                        tracing::info!(
                            node_id = request.node_id(),
                            seed = %seed,
                            leader = %leader,
                            round,
                            "Joined cluster"
                        );
                        return Ok(Joined {
                            seed: seed.clone(),
                            leader,
                            round,
                        });
                    }
                    Err(e) => last_error = Some(e),
                }
            }

            tracing::info!(
                addrs = ?self.config.join_addrs,
                round,
                attempts = self.config.attempts,
                retry_in_ms = self.config.attempt_interval.as_millis() as u64,
                "Failed to join cluster"
            );
            if round < self.config.attempts {
                sleep(self.config.attempt_interval).await;
            }
        }

        Err(JoinExhausted {
            addrs: self.config.join_addrs.clone(),
            attempts: self.config.attempts,
            last_error,
        })
    }

    /// Join through a single seed, following leader hints.
    ///
    /// Returns the address that accepted the join.
    pub async fn join_once(
        &self,
        seed: &str,
        request: &JoinRequest,
        deadline: Instant,
    ) -> Result<String, JoinError> {
        let mut target = seed.to_string();
        let mut hops = 0usize;

        loop {
            if Instant::now() >= deadline {
                tracing::warn!(addr = %target, "Join deadline exceeded");
                return Err(JoinError::DeadlineExceeded { addr: target });
            }

            let call = self.transport.join(&target, request, deadline);
            let result = match timeout_at(deadline, call).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(addr = %target, "Join deadline exceeded during call");
                    return Err(JoinError::DeadlineExceeded { addr: target });
                }
            };

            match result {
                Ok(()) => return Ok(target),
                Err(CallError::Rpc { addr, status }) => match next_hop(&addr, &status) {
                    Next::Redirect(leader) => {
                        hops += 1;
                        if hops > self.config.max_redirects {
                            tracing::warn!(addr = %addr, hops, "Too many leader redirects");
                            return Err(JoinError::TooManyRedirects { addr, hops });
                        }
                        tracing::debug!(from = %addr, to = %leader, hops, "Following leader hint");
                        target = leader;
                    }
                    Next::Fail(e) => return Err(e),
                    Next::Propagate => {
                        tracing::warn!(addr = %addr, error = %status, "RpcJoin failed");
                        return Err(CallError::Rpc { addr, status }.into());
                    }
                },
                Err(e) => {
                    tracing::warn!(addr = %e.addr(), error = %e, "Did not connect");
                    return Err(e.into());
                }
            }
        }
    }
}

/// Decide where a rejected join goes next.
fn next_hop(addr: &str, status: &tonic::Status) -> Next {
    let remote = match RemoteError::from_status(status) {
        Ok(Some(remote)) => remote,
        Ok(None) => return Next::Propagate,
        Err(source) => {
            tracing::error!(addr, error = %source, "Failed to decode error status");
            return Next::Fail(JoinError::Decode {
                addr: addr.to_string(),
                source,
            });
        }
    };

    if !remote.is_not_leader() {
        tracing::error!(addr, error = %remote, "Join rejected");
        return Next::Fail(JoinError::Rejected {
            addr: addr.to_string(),
            error: remote,
        });
    }

    match remote.leader_hint() {
        None => {
            tracing::error!(addr, error = %remote, "Not leader and no hint attached");
            Next::Fail(JoinError::Rejected {
                addr: addr.to_string(),
                error: remote,
            })
        }
        Some(Err(source)) => {
            tracing::error!(addr, error = %source, "Failed to decode leader hint");
            Next::Fail(JoinError::Decode {
                addr: addr.to_string(),
                source,
            })
        }
        Some(Ok(hint)) if hint.addr.is_empty() => {
            tracing::debug!(node = addr, "Not found leader");
            Next::Fail(JoinError::LeaderNotFound {
                addr: addr.to_string(),
            })
        }
        Some(Ok(hint)) => Next::Redirect(resolve_hint(&hint.addr, addr)),
    }
}

/// Leaders bound to `0.0.0.0` advertise that address; reach them through
/// the host of the peer that sent the hint instead.
fn resolve_hint(hint: &str, from: &str) -> String {
    let Some(port) = hint.strip_prefix("0.0.0.0:") else {
        return hint.to_string();
    };
    let from_host = from
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or("127.0.0.1");
    format!("{}:{}", from_host, port)
}

/// Join the cluster described by `config`, exiting the process on failure.
pub async fn join_cluster(config: &JoinConfig, request: JoinRequest) -> Joined {
    ClusterJoiner::new(config.clone()).join_or_exit(&request).await
}
