//! Outbound transports for the two Raft RPCs.
//!
//! The client holds an ordered list of transports and walks it inside every attempt, so one
//! transport failing (peer without a gRPC service, refused connection, bad body) falls through
//! to the next one before the attempt counts as failed.

use std::{fmt, future::Future, pin::Pin, time::Duration};

use crate::types::{AppendEntriesArgs, AppendEntriesReply, RequestVoteArgs, RequestVoteReply};

pub mod grpc;
pub mod http;

pub use grpc::GrpcTransport;
pub use http::HttpTransport;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Grpc,
    Http,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grpc => f.write_str("grpc"),
            Self::Http => f.write_str("http"),
        }
    }
}

/// Why a single transport attempt failed.
///
/// None of these reach the consensus engine: the client turns the last one into the `reason`
/// of a negative [`crate::types::RpcResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection refused, reset, or the address did not resolve.
    Unreachable(String),
    Timeout(Duration),
    /// The peer answered with something that is not a valid reply.
    Protocol(String),
    /// Non-2xx HTTP status.
    Status(u16),
    /// The peer (or this build) does not speak the transport.
    Unsupported(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable(msg) => f.write_str(msg),
            Self::Timeout(after) => write!(f, "timed out after {}ms", after.as_millis()),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Status(code) => write!(f, "unexpected http status {code}"),
            Self::Unsupported(msg) => write!(f, "unsupported: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// One way of delivering Raft RPCs to a peer at `host:port`.
pub trait Transport: Send + Sync + 'static {
    fn kind(&self) -> TransportKind;

    fn send_request_vote<'a>(
        &'a self,
        peer_address: &'a str,
        args: &'a RequestVoteArgs,
    ) -> BoxFuture<'a, Result<RequestVoteReply, TransportError>>;

    fn send_append_entries<'a>(
        &'a self,
        peer_address: &'a str,
        args: &'a AppendEntriesArgs,
    ) -> BoxFuture<'a, Result<AppendEntriesReply, TransportError>>;
}
