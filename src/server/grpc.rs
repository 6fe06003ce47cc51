use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context as _;
use tokio::{
    net::TcpListener,
    sync::{Semaphore, oneshot},
    task::JoinHandle,
};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};
use tracing::warn;

use crate::{
    proto::raft::{
        self,
        raft_server::{Raft, RaftServer},
    },
    server::{Dispatcher, Listener},
    transport::{BoxFuture, TransportKind},
    types::{AppendEntriesArgs, RequestVoteArgs},
};

/// Upper bound on handler invocations running at once for gRPC requests.
pub const HANDLER_WORKERS: usize = 10;

/// How long in-flight RPCs get to finish once `stop` is called.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct RaftService {
    dispatcher: Arc<Dispatcher>,
    workers: Arc<Semaphore>,
}

impl RaftService {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            workers: Arc::new(Semaphore::new(HANDLER_WORKERS)),
        }
    }

    /// Run `fut` on its own task once a worker permit is free, so a slow handler only
    /// occupies a worker and never the connection task.
    async fn run<T: Send + 'static>(
        &self,
        fut: impl Future<Output = T> + Send + 'static,
    ) -> Result<T, Status> {
        let permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Status::unavailable("raft handler workers closed"))?;
        tokio::spawn(async move {
            let _permit = permit;
            fut.await
        })
        .await
        .map_err(|e| Status::internal(format!("raft handler task: {e}")))
    }
}

#[tonic::async_trait]
impl Raft for RaftService {
    async fn request_vote(
        &self,
        request: Request<raft::RequestVoteRequest>,
    ) -> Result<Response<raft::RequestVoteResponse>, Status> {
        let args = RequestVoteArgs::from(request.into_inner());
        let dispatcher = self.dispatcher.clone();
        let result = self
            .run(async move { dispatcher.request_vote(args).await })
            .await?;
        Ok(Response::new(result.into()))
    }

    async fn append_entries(
        &self,
        request: Request<raft::AppendEntriesRequest>,
    ) -> Result<Response<raft::AppendEntriesResponse>, Status> {
        let args = AppendEntriesArgs::try_from(request.into_inner())
            .map_err(|e| Status::invalid_argument(format!("invalid log entry: {e}")))?;
        let dispatcher = self.dispatcher.clone();
        let result = self
            .run(async move { dispatcher.append_entries(args).await })
            .await?;
        Ok(Response::new(result.into()))
    }
}

/// tonic server for the `raftnet.raft.Raft` service.
pub struct GrpcListener {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    join: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl GrpcListener {
    pub async fn bind(listen_address: &str, dispatcher: Arc<Dispatcher>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(listen_address)
            .await
            .with_context(|| format!("bind raft grpc listener: {listen_address}"))?;
        let local_addr = listener
            .local_addr()
            .context("raft grpc listener local_addr")?;

        let incoming = TcpListenerStream::new(listener);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tonic::transport::Server::builder()
            .add_service(RaftServer::new(RaftService::new(dispatcher)))
            .serve_with_incoming_shutdown(incoming, async {
                let _ = shutdown_rx.await;
            });
        let join = tokio::spawn(server);

        Ok(Self {
            local_addr,
            shutdown_tx,
            join,
        })
    }
}

impl Listener for GrpcListener {
    fn kind(&self) -> TransportKind {
        TransportKind::Grpc
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
                    .context("join raft grpc server task")?
                    .context("raft grpc server exited with error"),
                Err(_) => {
                    warn!(
                        grace_secs = SHUTDOWN_GRACE.as_secs(),
                        "raft grpc server still busy after grace period, aborting"
                    );
                    join.abort();
                    Ok(())
                }
            }
        })
    }
}
