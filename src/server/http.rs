use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context as _;
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{
    server::{Dispatcher, Listener},
    transport::{
        BoxFuture, TransportKind,
        http::{APPEND_ENTRIES_PATH, HEALTH_PATH, REQUEST_VOTE_PATH},
    },
    types::{
        AppendEntriesArgs, AppendEntriesResult, HealthStatus, RequestVoteArgs, RequestVoteResult,
    },
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct RaftRpcState {
    dispatcher: Arc<Dispatcher>,
}

impl RaftRpcState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

pub fn build_raft_rpc_router(state: RaftRpcState) -> Router {
    Router::new()
        .route(REQUEST_VOTE_PATH, post(request_vote))
        .route(APPEND_ENTRIES_PATH, post(append_entries))
        .route(HEALTH_PATH, get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn request_vote(
    State(state): State<RaftRpcState>,
    payload: Result<Json<RequestVoteArgs>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(args)) => Json(state.dispatcher.request_vote(args).await).into_response(),
        Err(rejection) => {
            warn!(error = %rejection, "malformed RequestVote body");
            (
                StatusCode::BAD_REQUEST,
                Json(RequestVoteResult::rejected(0, rejection.body_text())),
            )
                .into_response()
        }
    }
}

async fn append_entries(
    State(state): State<RaftRpcState>,
    payload: Result<Json<AppendEntriesArgs>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(args)) => Json(state.dispatcher.append_entries(args).await).into_response(),
        Err(rejection) => {
            warn!(error = %rejection, "malformed AppendEntries body");
            (
                StatusCode::BAD_REQUEST,
                Json(AppendEntriesResult::rejected(0, rejection.body_text())),
            )
                .into_response()
        }
    }
}

async fn health(State(state): State<RaftRpcState>) -> Json<HealthStatus> {
    Json(state.dispatcher.health())
}

/// The raft routes served by axum on their own socket.
pub struct HttpListener {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    join: JoinHandle<std::io::Result<()>>,
}

impl HttpListener {
    pub async fn bind(listen_address: &str, dispatcher: Arc<Dispatcher>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(listen_address)
            .await
            .with_context(|| format!("bind raft http listener: {listen_address}"))?;
        let local_addr = listener
            .local_addr()
            .context("raft http listener local_addr")?;

        let router = build_raft_rpc_router(RaftRpcState::new(dispatcher));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Ok(Self {
            local_addr,
            shutdown_tx,
            join,
        })
    }
}

impl Listener for HttpListener {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn stop(self: Box<Self>) -> BoxFuture<'static, anyhow::Result<()>> {
        let Self {
            shutdown_tx,
            mut join,
            ..
        } = *self;
        Box::pin(async move {
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut join).await {
                Ok(res) => res
                    .context("join raft http server task")?
                    .context("raft http server exited with error"),
                Err(_) => {
                    join.abort();
                    anyhow::bail!(
                        "raft http server did not drain within {}s",
                        SHUTDOWN_GRACE.as_secs()
                    )
                }
            }
        })
    }
}
