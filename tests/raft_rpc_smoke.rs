use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

use raftnet::{
    AppendEntriesArgs, AppendEntriesResult, ClientConfig, RaftNetworkClient, RaftNetworkServer,
    RequestVoteArgs, RequestVoteResult, RpcResponse, ServerConfig, ServerState, TransportKind,
};

fn client_config(node_id: &str, prefer_grpc: bool) -> ClientConfig {
    ClientConfig {
        node_id: node_id.to_string(),
        rpc_timeout: Duration::from_secs(2),
        max_retries: 2,
        backoff_base: Duration::from_millis(10),
        prefer_grpc,
    }
}

/// Start a follower that votes for anyone with a log at least as long as its own (5 entries)
/// and accepts AppendEntries from the current term only.
async fn start_follower(node_id: &str, prefer_grpc: bool) -> (RaftNetworkServer, String) {
    let server = RaftNetworkServer::new(ServerConfig {
        node_id: node_id.to_string(),
        listen_address: "127.0.0.1:0".to_string(),
        prefer_grpc,
    });
    server.set_request_vote_handler(|args: RequestVoteArgs| async move {
        Ok::<_, anyhow::Error>(RequestVoteResult {
            term: args.term,
            vote_granted: args.last_log_index >= 5,
            reason: None,
        })
    });
    server.set_append_entries_handler(|args: AppendEntriesArgs| async move {
        if args.term < 2 {
            return Ok::<_, anyhow::Error>(AppendEntriesResult::rejected(2, "stale term"));
        }
        Ok(AppendEntriesResult {
            term: args.term,
            success: true,
            reason: None,
        })
    });

    let expected = if prefer_grpc {
        TransportKind::Grpc
    } else {
        TransportKind::Http
    };
    assert_eq!(server.start().await, ServerState::Listening(expected));
    let addr = server.local_addr().await.expect("listening").to_string();
    (server, addr)
}

fn vote(term: u64, last_log_index: u64) -> RequestVoteArgs {
    RequestVoteArgs {
        term,
        candidate_id: "n1".to_string(),
        last_log_index,
        last_log_term: 1,
    }
}

#[tokio::test]
async fn election_and_replication_over_grpc() {
    let (server, addr) = start_follower("n2", true).await;
    let client = RaftNetworkClient::new(client_config("n1", true)).unwrap();
    client.add_peer("n2", addr);

    let granted = client.request_vote("n2", None, vote(2, 5)).await;
    assert_eq!(
        granted,
        RpcResponse {
            term: 2,
            outcome: true,
            reason: None,
        }
    );

    let denied = client.request_vote("n2", None, vote(2, 1)).await;
    assert!(!denied.outcome);

    let append = client
        .append_entries(
            "n2",
            None,
            AppendEntriesArgs {
                term: 2,
                leader_id: "n1".to_string(),
                prev_log_index: 5,
                prev_log_term: 1,
                entries: vec![json!({"index": 6, "term": 2, "command": "set x=1"})],
                leader_commit: 5,
            },
        )
        .await;
    assert!(append.outcome);
    assert_eq!(client.active_transport(), TransportKind::Grpc);

    server.stop().await;
}

#[tokio::test]
async fn stale_leader_learns_newer_term_from_rejection() {
    let (server, addr) = start_follower("n2", false).await;
    let client = RaftNetworkClient::new(client_config("n1", false)).unwrap();

    let resp = client
        .append_entries(
            "n2",
            Some(&addr),
            AppendEntriesArgs {
                term: 1,
                leader_id: "n1".to_string(),
                ..Default::default()
            },
        )
        .await;

    assert_eq!(
        resp,
        RpcResponse {
            term: 2,
            outcome: false,
            reason: Some("stale term".to_string()),
        }
    );
    server.stop().await;
}

#[tokio::test]
async fn grpc_client_falls_back_to_http_only_peer() {
    let (server, addr) = start_follower("n2", false).await;
    let client = RaftNetworkClient::new(client_config("n1", true)).unwrap();

    let resp = client.request_vote("n2", Some(&addr), vote(3, 9)).await;

    assert_eq!(
        resp,
        RpcResponse {
            term: 3,
            outcome: true,
            reason: None,
        }
    );
    assert_eq!(client.active_transport(), TransportKind::Http);
    server.stop().await;
}

#[tokio::test]
async fn unreachable_peer_yields_negative_response() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let client = RaftNetworkClient::new(client_config("n1", true)).unwrap();
    let resp = client.request_vote("n2", Some(&addr), vote(4, 9)).await;

    assert_eq!(resp.term, 4);
    assert!(!resp.outcome);
    assert!(resp.reason.is_some());
}

#[tokio::test]
async fn http_reply_term_overrides_request_term() {
    let peer = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/raft/request_vote"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"term": 5, "vote_granted": true})),
        )
        .mount(&peer)
        .await;

    let client = RaftNetworkClient::new(client_config("n1", false)).unwrap();
    let resp = client
        .request_vote("n2", Some(&peer.address().to_string()), vote(3, 0))
        .await;

    assert_eq!(
        resp,
        RpcResponse {
            term: 5,
            outcome: true,
            reason: None,
        }
    );
}

#[tokio::test]
async fn health_probe_over_http() {
    let (server, addr) = start_follower("n2", false).await;
    let client = RaftNetworkClient::new(client_config("n1", false)).unwrap();

    let health = client.check_health(&addr).await.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.node_id, "n2");

    server.stop().await;
    assert!(client.check_health(&addr).await.is_err());
}

#[tokio::test]
async fn stop_twice_never_started_or_stopped() {
    let server = RaftNetworkServer::new(ServerConfig {
        node_id: "n3".to_string(),
        listen_address: "127.0.0.1:0".to_string(),
        prefer_grpc: true,
    });
    server.stop().await;
    server.stop().await;

    server.start().await;
    server.stop().await;
    server.stop().await;
    assert_eq!(server.state().await, ServerState::Stopped);
}
