//! Inbound side of the Raft network layer.
//!
//! The server owns one listener at a time (gRPC preferred, HTTP as fallback) and routes every
//! inbound RPC to the handler the consensus engine registered. Handler failures never reach the
//! listener: they become negative responses echoing the inbound term.

use std::{
    any::Any,
    future::Future,
    net::SocketAddr,
    panic::AssertUnwindSafe,
    sync::{Arc, PoisonError, RwLock},
};

use futures_util::FutureExt as _;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    config::ServerConfig,
    transport::{BoxFuture, TransportKind},
    types::{
        AppendEntriesArgs, AppendEntriesResult, HealthStatus, RequestVoteArgs, RequestVoteResult,
    },
};

pub mod grpc;
pub mod http;

pub use grpc::GrpcListener;
pub use http::HttpListener;

pub const NO_HANDLER: &str = "No handler";

/// Consensus-engine callback for inbound RequestVote.
///
/// Implemented for any `Fn(RequestVoteArgs) -> impl Future<Output = anyhow::Result<_>>`.
pub trait RequestVoteHandler: Send + Sync + 'static {
    fn handle(&self, args: RequestVoteArgs)
    -> BoxFuture<'static, anyhow::Result<RequestVoteResult>>;
}

impl<F, Fut> RequestVoteHandler for F
where
    F: Fn(RequestVoteArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<RequestVoteResult>> + Send + 'static,
{
    fn handle(
        &self,
        args: RequestVoteArgs,
    ) -> BoxFuture<'static, anyhow::Result<RequestVoteResult>> {
        Box::pin(self(args))
    }
}

/// Consensus-engine callback for inbound AppendEntries.
pub trait AppendEntriesHandler: Send + Sync + 'static {
    fn handle(
        &self,
        args: AppendEntriesArgs,
    ) -> BoxFuture<'static, anyhow::Result<AppendEntriesResult>>;
}

impl<F, Fut> AppendEntriesHandler for F
where
    F: Fn(AppendEntriesArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<AppendEntriesResult>> + Send + 'static,
{
    fn handle(
        &self,
        args: AppendEntriesArgs,
    ) -> BoxFuture<'static, anyhow::Result<AppendEntriesResult>> {
        Box::pin(self(args))
    }
}

/// Handler slots plus the normalization rules, shared by every listener.
pub struct Dispatcher {
    node_id: String,
    request_vote: RwLock<Option<Arc<dyn RequestVoteHandler>>>,
    append_entries: RwLock<Option<Arc<dyn AppendEntriesHandler>>>,
}

impl Dispatcher {
    fn new(node_id: String) -> Self {
        Self {
            node_id,
            request_vote: RwLock::new(None),
            append_entries: RwLock::new(None),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus::healthy(self.node_id.clone())
    }

    pub async fn request_vote(&self, args: RequestVoteArgs) -> RequestVoteResult {
        let handler = self
            .request_vote
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(handler) = handler else {
            return RequestVoteResult::rejected(0, NO_HANDLER);
        };

        let term = args.term;
        match AssertUnwindSafe(async move { handler.handle(args).await })
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                error!(term, error = %err, "RequestVote handler failed");
                RequestVoteResult::rejected(term, err.to_string())
            }
            Err(panic) => {
                let reason = panic_message(&*panic);
                error!(term, %reason, "RequestVote handler panicked");
                RequestVoteResult::rejected(term, reason)
            }
        }
    }

    pub async fn append_entries(&self, args: AppendEntriesArgs) -> AppendEntriesResult {
        let handler = self
            .append_entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(handler) = handler else {
            return AppendEntriesResult::rejected(0, NO_HANDLER);
        };

        let term = args.term;
        match AssertUnwindSafe(async move { handler.handle(args).await })
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                error!(term, error = %err, "AppendEntries handler failed");
                AppendEntriesResult::rejected(term, err.to_string())
            }
            Err(panic) => {
                let reason = panic_message(&*panic);
                error!(term, %reason, "AppendEntries handler panicked");
                AppendEntriesResult::rejected(term, reason)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        return format!("handler panicked: {msg}");
    }
    if let Some(msg) = panic.downcast_ref::<String>() {
        return format!("handler panicked: {msg}");
    }
    "handler panicked".to_string()
}

/// A running listener, chosen at [`RaftNetworkServer::start`].
pub trait Listener: Send + Sync {
    fn kind(&self) -> TransportKind;

    fn local_addr(&self) -> SocketAddr;

    /// Stop accepting and release the socket, letting in-flight RPCs finish first.
    fn stop(self: Box<Self>) -> BoxFuture<'static, anyhow::Result<()>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Listening(TransportKind),
    /// No listener could be started; handlers stay callable in-process.
    Degraded,
}

enum Slot {
    Stopped,
    Degraded,
    Active(Box<dyn Listener>),
}

pub struct RaftNetworkServer {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    slot: Mutex<Slot>,
}

impl std::fmt::Debug for RaftNetworkServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaftNetworkServer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RaftNetworkServer {
    pub fn new(config: ServerConfig) -> Self {
        info!(
            node_id = %config.node_id,
            listen_address = %config.listen_address,
            prefer_grpc = config.prefer_grpc,
            "raft network server initialized"
        );
        let dispatcher = Arc::new(Dispatcher::new(config.node_id.clone()));
        Self {
            config,
            dispatcher,
            slot: Mutex::new(Slot::Stopped),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Replaces any previously registered RequestVote handler.
    pub fn set_request_vote_handler(&self, handler: impl RequestVoteHandler) {
        *self
            .dispatcher
            .request_vote
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    /// Replaces any previously registered AppendEntries handler.
    pub fn set_append_entries_handler(&self, handler: impl AppendEntriesHandler) {
        *self
            .dispatcher
            .append_entries
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    pub async fn handle_request_vote(&self, args: RequestVoteArgs) -> RequestVoteResult {
        self.dispatcher.request_vote(args).await
    }

    pub async fn handle_append_entries(&self, args: AppendEntriesArgs) -> AppendEntriesResult {
        self.dispatcher.append_entries(args).await
    }

    /// The HTTP routes, for hosts that mount them on their own axum server.
    pub fn http_router(&self) -> axum::Router {
        http::build_raft_rpc_router(http::RaftRpcState::new(self.dispatcher.clone()))
    }

    /// Start listening on `listen_address`. Never fails: when neither gRPC nor HTTP can be
    /// bound the server ends up [`ServerState::Degraded`].
    pub async fn start(&self) -> ServerState {
        let mut slot = self.slot.lock().await;
        if let Slot::Active(listener) = &*slot {
            return ServerState::Listening(listener.kind());
        }

        let addr = self.config.listen_address.as_str();
        if self.config.prefer_grpc {
            match GrpcListener::bind(addr, self.dispatcher.clone()).await {
                Ok(listener) => {
                    info!(
                        node_id = %self.config.node_id,
                        addr = %listener.local_addr(),
                        "raft grpc server started"
                    );
                    *slot = Slot::Active(Box::new(listener));
                    return ServerState::Listening(TransportKind::Grpc);
                }
                Err(err) => {
                    warn!(
                        addr,
                        error = %format!("{err:#}"),
                        "failed to start raft grpc server, falling back to http"
                    );
                }
            }
        }

        match HttpListener::bind(addr, self.dispatcher.clone()).await {
            Ok(listener) => {
                info!(
                    node_id = %self.config.node_id,
                    addr = %listener.local_addr(),
                    "raft http server started"
                );
                *slot = Slot::Active(Box::new(listener));
                ServerState::Listening(TransportKind::Http)
            }
            Err(err) => {
                error!(
                    addr,
                    error = %format!("{err:#}"),
                    "failed to start raft http server, running without listener"
                );
                *slot = Slot::Degraded;
                ServerState::Degraded
            }
        }
    }

    /// Idempotent; stopping a stopped server does nothing.
    pub async fn stop(&self) {
        let slot = std::mem::replace(&mut *self.slot.lock().await, Slot::Stopped);
        match slot {
            Slot::Active(listener) => {
                let kind = listener.kind();
                if let Err(err) = listener.stop().await {
                    warn!(
                        node_id = %self.config.node_id,
                        %kind,
                        error = %format!("{err:#}"),
                        "raft server did not stop cleanly"
                    );
                }
                info!(node_id = %self.config.node_id, %kind, "raft network server stopped");
            }
            Slot::Degraded => {
                info!(node_id = %self.config.node_id, "raft network server (no listener) stopped");
            }
            Slot::Stopped => {}
        }
    }

    pub async fn state(&self) -> ServerState {
        match &*self.slot.lock().await {
            Slot::Stopped => ServerState::Stopped,
            Slot::Degraded => ServerState::Degraded,
            Slot::Active(listener) => ServerState::Listening(listener.kind()),
        }
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.slot.lock().await {
            Slot::Active(listener) => Some(listener.local_addr()),
            _ => None,
        }
    }
}
