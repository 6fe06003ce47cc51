use std::time::Duration;

use clap::Args;

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:50051";
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(1_000);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(100);

/// Raft networking settings, meant to be flattened into the host's CLI.
///
/// The client and the server of one node share the node id and the transport preference, so
/// they are configured together and split with [`NetworkConfig::client`] /
/// [`NetworkConfig::server`].
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    #[arg(long = "raft-node-id", env = "RAFTNET_NODE_ID", value_name = "ID")]
    pub node_id: String,

    #[arg(
        long = "raft-listen",
        env = "RAFTNET_LISTEN_ADDRESS",
        value_name = "HOST:PORT",
        default_value = DEFAULT_LISTEN_ADDRESS
    )]
    pub listen_address: String,

    #[arg(
        long = "raft-rpc-timeout-ms",
        env = "RAFTNET_RPC_TIMEOUT_MS",
        value_name = "MS",
        default_value_t = 1_000,
        value_parser = clap::value_parser!(u64).range(1..=60_000)
    )]
    pub rpc_timeout_ms: u64,

    #[arg(
        long = "raft-max-retries",
        env = "RAFTNET_MAX_RETRIES",
        value_name = "N",
        default_value_t = DEFAULT_MAX_RETRIES,
        value_parser = clap::value_parser!(u32).range(1..=20)
    )]
    pub max_retries: u32,

    #[arg(
        long = "raft-backoff-base-ms",
        env = "RAFTNET_BACKOFF_BASE_MS",
        value_name = "MS",
        default_value_t = 100,
        value_parser = clap::value_parser!(u64).range(0..=10_000)
    )]
    pub backoff_base_ms: u64,

    #[arg(
        long = "raft-prefer-grpc",
        env = "RAFTNET_PREFER_GRPC",
        value_name = "BOOL",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub prefer_grpc: bool,
}

impl NetworkConfig {
    pub fn client(&self) -> ClientConfig {
        ClientConfig {
            node_id: self.node_id.clone(),
            rpc_timeout: Duration::from_millis(self.rpc_timeout_ms),
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            prefer_grpc: self.prefer_grpc,
        }
    }

    pub fn server(&self) -> ServerConfig {
        ServerConfig {
            node_id: self.node_id.clone(),
            listen_address: self.listen_address.clone(),
            prefer_grpc: self.prefer_grpc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub node_id: String,
    /// Bound on each individual transport attempt.
    pub rpc_timeout: Duration,
    pub max_retries: u32,
    /// Attempt `n` (0-based) is followed by a sleep of `backoff_base * (n + 1)`.
    pub backoff_base: Duration,
    pub prefer_grpc: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            prefer_grpc: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub node_id: String,
    pub listen_address: String,
    pub prefer_grpc: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            prefer_grpc: true,
        }
    }
}
