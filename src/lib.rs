//! Raft RPC transport for one cluster node.
//!
//! [`RaftNetworkClient`] sends RequestVote / AppendEntries to peers over gRPC with an HTTP/JSON
//! fallback, retrying with linear backoff. [`RaftNetworkServer`] accepts the same RPCs and hands
//! them to callbacks registered by the consensus engine. The Raft rules themselves (terms, votes,
//! log matching) live in those callbacks, not here.

pub mod client;
pub mod config;
pub mod peers;
pub mod proto;
pub mod server;
pub mod transport;
pub mod types;

pub use client::RaftNetworkClient;
pub use config::{ClientConfig, NetworkConfig, ServerConfig};
pub use server::{RaftNetworkServer, ServerState};
pub use transport::{Transport, TransportError, TransportKind};
pub use types::{
    AppendEntriesArgs, AppendEntriesResult, LogEntry, RequestVoteArgs, RequestVoteResult,
    RpcResponse,
};
