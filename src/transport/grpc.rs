use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::{
    proto::raft::{self, raft_client::RaftClient},
    transport::{BoxFuture, Transport, TransportError, TransportKind},
    types::{AppendEntriesArgs, AppendEntriesReply, RequestVoteArgs, RequestVoteReply},
};

/// gRPC transport over tonic.
///
/// Channels are cached per peer address and dropped after any failure, so the next call
/// reconnects from scratch. Every call (connect included) is bounded by `timeout`.
#[derive(Debug)]
pub struct GrpcTransport {
    timeout: Duration,
    channels: Mutex<HashMap<String, Channel>>,
}

impl GrpcTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            channels: Mutex::new(HashMap::new()),
        }
    }

    async fn client(&self, peer_address: &str) -> Result<RaftClient<Channel>, TransportError> {
        let cached = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(peer_address)
            .cloned();
        if let Some(channel) = cached {
            return Ok(RaftClient::new(channel));
        }

        let endpoint = Endpoint::from_shared(format!("http://{peer_address}"))
            .map_err(|e| {
                TransportError::Unreachable(format!("invalid peer address {peer_address}: {e}"))
            })?
            .connect_timeout(self.timeout)
            .timeout(self.timeout);
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| TransportError::Unreachable(error_chain(&e)))?;

        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer_address.to_string(), channel.clone());
        Ok(RaftClient::new(channel))
    }

    fn evict(&self, peer_address: &str) {
        let removed = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(peer_address);
        if removed.is_some() {
            debug!(peer_address, "dropped grpc channel");
        }
    }

    fn with_deadline<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request.set_timeout(self.timeout);
        request
    }

    async fn request_vote(
        &self,
        peer_address: &str,
        args: &RequestVoteArgs,
    ) -> Result<RequestVoteReply, TransportError> {
        let call = async {
            let mut client = self.client(peer_address).await?;
            let resp = client
                .request_vote(self.with_deadline(raft::RequestVoteRequest::from(args)))
                .await
                .map_err(|status| classify_status(&status, self.timeout))?;
            Ok::<_, TransportError>(RequestVoteReply::from(resp.into_inner()))
        };
        let res = self.bounded(call).await;
        if res.is_err() {
            self.evict(peer_address);
        }
        res
    }

    async fn append_entries(
        &self,
        peer_address: &str,
        args: &AppendEntriesArgs,
    ) -> Result<AppendEntriesReply, TransportError> {
        let req = raft::AppendEntriesRequest::try_from(args)
            .map_err(|e| TransportError::Protocol(format!("encode entries: {e}")))?;
        let call = async {
            let mut client = self.client(peer_address).await?;
            let resp = client
                .append_entries(self.with_deadline(req))
                .await
                .map_err(|status| classify_status(&status, self.timeout))?;
            Ok::<_, TransportError>(AppendEntriesReply::from(resp.into_inner()))
        };
        let res = self.bounded(call).await;
        if res.is_err() {
            self.evict(peer_address);
        }
        res
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(TransportError::Timeout(self.timeout)))
    }
}

impl Transport for GrpcTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Grpc
    }

    fn send_request_vote<'a>(
        &'a self,
        peer_address: &'a str,
        args: &'a RequestVoteArgs,
    ) -> BoxFuture<'a, Result<RequestVoteReply, TransportError>> {
        Box::pin(self.request_vote(peer_address, args))
    }

    fn send_append_entries<'a>(
        &'a self,
        peer_address: &'a str,
        args: &'a AppendEntriesArgs,
    ) -> BoxFuture<'a, Result<AppendEntriesReply, TransportError>> {
        Box::pin(self.append_entries(peer_address, args))
    }
}

fn classify_status(status: &tonic::Status, timeout: Duration) -> TransportError {
    match status.code() {
        tonic::Code::Unimplemented => TransportError::Unsupported(status.message().to_string()),
        tonic::Code::DeadlineExceeded | tonic::Code::Cancelled => TransportError::Timeout(timeout),
        tonic::Code::Unavailable => TransportError::Unreachable(status.message().to_string()),
        code => TransportError::Protocol(format!("{code:?}: {}", status.message())),
    }
}

// tonic's transport error prints as "transport error"; the useful part is in the sources.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
