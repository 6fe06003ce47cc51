//! Outbound side of the Raft network layer.
//!
//! [`RaftNetworkClient`] never fails from the caller's point of view: every transport problem
//! ends up as a negative [`RpcResponse`] carrying the last error text as `reason`.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{
    config::ClientConfig,
    peers::PeerRegistry,
    transport::{GrpcTransport, HttpTransport, Transport, TransportError, TransportKind},
    types::{AppendEntriesArgs, HealthStatus, RequestVoteArgs, RpcResponse},
};

pub const MAX_RETRIES_EXCEEDED: &str = "Max retries exceeded";

pub struct RaftNetworkClient {
    config: ClientConfig,
    peers: PeerRegistry,
    /// Priority order; index 0 is the preferred transport.
    transports: Vec<Arc<dyn Transport>>,
    /// Index into `transports` of the last transport that delivered an RPC.
    active: AtomicUsize,
    health: HttpTransport,
}

impl std::fmt::Debug for RaftNetworkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaftNetworkClient")
            .field("node_id", &self.config.node_id)
            .field("transports", &self.transport_kinds())
            .field("active", &self.active_transport())
            .finish_non_exhaustive()
    }
}

impl RaftNetworkClient {
    /// gRPC first with HTTP fallback when `prefer_grpc`, HTTP only otherwise.
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let http: Arc<dyn Transport> = Arc::new(HttpTransport::try_new(config.rpc_timeout)?);
        let transports = if config.prefer_grpc {
            let grpc: Arc<dyn Transport> = Arc::new(GrpcTransport::new(config.rpc_timeout));
            vec![grpc, http]
        } else {
            vec![http]
        };
        Self::with_transports(config, transports)
    }

    pub fn with_transports(
        config: ClientConfig,
        transports: Vec<Arc<dyn Transport>>,
    ) -> anyhow::Result<Self> {
        if transports.is_empty() {
            anyhow::bail!("raft network client needs at least one transport");
        }
        let health = HttpTransport::try_new(config.rpc_timeout)?;
        let client = Self {
            config,
            peers: PeerRegistry::new(),
            transports,
            active: AtomicUsize::new(0),
            health,
        };
        info!(
            node_id = %client.config.node_id,
            transports = ?client.transport_kinds(),
            max_retries = client.config.max_retries,
            rpc_timeout_ms = client.config.rpc_timeout.as_millis() as u64,
            "raft network client initialized"
        );
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport_kinds(&self) -> Vec<TransportKind> {
        self.transports.iter().map(|t| t.kind()).collect()
    }

    /// The transport the next attempt starts with.
    pub fn active_transport(&self) -> TransportKind {
        self.transports[self.active_index()].kind()
    }

    fn active_index(&self) -> usize {
        self.active.load(Ordering::Relaxed) % self.transports.len()
    }

    pub fn add_peer(&self, peer_id: impl Into<String>, peer_address: impl Into<String>) {
        let (peer_id, peer_address) = (peer_id.into(), peer_address.into());
        debug!(%peer_id, %peer_address, "added raft peer");
        self.peers.add(peer_id, peer_address);
    }

    pub fn remove_peer(&self, peer_id: &str) {
        if self.peers.remove(peer_id).is_some() {
            debug!(peer_id, "removed raft peer");
        }
    }

    pub fn peer_address(&self, peer_id: &str) -> Option<String> {
        self.peers.get(peer_id)
    }

    pub fn peers(&self) -> BTreeMap<String, String> {
        self.peers.snapshot()
    }

    /// Send RequestVote to `peer_id`.
    ///
    /// `peer_address` wins over the registry; the registry is only consulted when it is `None`.
    pub async fn request_vote(
        &self,
        peer_id: &str,
        peer_address: Option<&str>,
        args: RequestVoteArgs,
    ) -> RpcResponse {
        self.call(peer_id, peer_address, Rpc::RequestVote(&args)).await
    }

    /// Send AppendEntries to `peer_id`; an empty `entries` is a heartbeat.
    pub async fn append_entries(
        &self,
        peer_id: &str,
        peer_address: Option<&str>,
        args: AppendEntriesArgs,
    ) -> RpcResponse {
        self.call(peer_id, peer_address, Rpc::AppendEntries(&args)).await
    }

    /// Probe `GET /raft/health` on a peer.
    pub async fn check_health(&self, peer_address: &str) -> Result<HealthStatus, TransportError> {
        self.health.health(peer_address).await
    }

    async fn call(&self, peer_id: &str, peer_address: Option<&str>, rpc: Rpc<'_>) -> RpcResponse {
        let term = rpc.term();
        let peer_address = match peer_address {
            Some(addr) => addr.to_string(),
            None => match self.peers.get(peer_id) {
                Some(addr) => addr,
                None => return RpcResponse::failure(term, format!("unknown peer {peer_id}")),
            },
        };

        let max_retries = self.config.max_retries;
        for attempt in 0..max_retries {
            match self.attempt(peer_id, &peer_address, &rpc).await {
                Ok(resp) => return resp,
                Err(err) => {
                    warn!(
                        rpc = rpc.name(),
                        peer_id,
                        attempt = attempt + 1,
                        max_retries,
                        error = %err,
                        "raft rpc attempt failed"
                    );
                    if attempt + 1 < max_retries {
                        tokio::time::sleep(backoff_delay(self.config.backoff_base, attempt)).await;
                    } else {
                        return RpcResponse::failure(term, err.to_string());
                    }
                }
            }
        }
        RpcResponse::failure(term, MAX_RETRIES_EXCEEDED)
    }

    /// One attempt: walk the transports starting at the active one until one delivers.
    async fn attempt(
        &self,
        peer_id: &str,
        peer_address: &str,
        rpc: &Rpc<'_>,
    ) -> Result<RpcResponse, TransportError> {
        let start = self.active_index();
        let count = self.transports.len();
        let mut last_err = None;
        for offset in 0..count {
            let index = (start + offset) % count;
            let transport = self.transports[index].as_ref();
            match rpc.send(transport, peer_address).await {
                Ok(resp) => {
                    if index != start {
                        info!(
                            rpc = rpc.name(),
                            peer_id,
                            transport = %transport.kind(),
                            "raft rpc transport switched"
                        );
                        self.active.store(index, Ordering::Relaxed);
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if offset + 1 < count {
                        debug!(
                            rpc = rpc.name(),
                            peer_id,
                            transport = %transport.kind(),
                            error = %err,
                            "raft rpc transport failed, falling back"
                        );
                    }
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| TransportError::Unsupported("no transport".to_string())))
    }
}

enum Rpc<'a> {
    RequestVote(&'a RequestVoteArgs),
    AppendEntries(&'a AppendEntriesArgs),
}

impl Rpc<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::RequestVote(_) => "RequestVote",
            Self::AppendEntries(_) => "AppendEntries",
        }
    }

    fn term(&self) -> u64 {
        match self {
            Self::RequestVote(args) => args.term,
            Self::AppendEntries(args) => args.term,
        }
    }

    async fn send(
        &self,
        transport: &dyn Transport,
        peer_address: &str,
    ) -> Result<RpcResponse, TransportError> {
        match self {
            Self::RequestVote(args) => transport
                .send_request_vote(peer_address, args)
                .await
                .map(|reply| RpcResponse::from_vote_reply(args.term, reply)),
            Self::AppendEntries(args) => transport
                .send_append_entries(peer_address, args)
                .await
                .map(|reply| RpcResponse::from_append_reply(args.term, reply)),
        }
    }
}

/// Linear backoff: the sleep after attempt `n` (0-based) is `base * (n + 1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt.saturating_add(1))
}
