use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    transport::{BoxFuture, Transport, TransportError, TransportKind},
    types::{
        AppendEntriesArgs, AppendEntriesReply, HealthStatus, RequestVoteArgs, RequestVoteReply,
    },
};

pub const REQUEST_VOTE_PATH: &str = "/raft/request_vote";
pub const APPEND_ENTRIES_PATH: &str = "/raft/append_entries";
pub const HEALTH_PATH: &str = "/raft/health";

/// JSON over plain HTTP: `POST http://{peer}/raft/...`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn try_new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("build raft http client: {e}"))?;
        Ok(Self { client, timeout })
    }

    fn url(peer_address: &str, path: &str) -> String {
        format!(
            "http://{}/{}",
            peer_address.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn post_json<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        peer_address: &str,
        path: &str,
        req: &Req,
    ) -> Result<Resp, TransportError> {
        let url = Self::url(peer_address, path);
        debug!(%url, "raft http post");
        self.client
            .post(url)
            .json(req)
            .send()
            .await
            .map_err(|e| self.classify(e))?
            .error_for_status()
            .map_err(|e| self.classify(e))?
            .json::<Resp>()
            .await
            .map_err(|e| self.classify(e))
    }

    /// `GET /raft/health` on a peer.
    pub async fn health(&self, peer_address: &str) -> Result<HealthStatus, TransportError> {
        self.client
            .get(Self::url(peer_address, HEALTH_PATH))
            .send()
            .await
            .map_err(|e| self.classify(e))?
            .error_for_status()
            .map_err(|e| self.classify(e))?
            .json::<HealthStatus>()
            .await
            .map_err(|e| self.classify(e))
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            return TransportError::Timeout(self.timeout);
        }
        if let Some(status) = err.status() {
            return TransportError::Status(status.as_u16());
        }
        if err.is_decode() {
            return TransportError::Protocol(err.to_string());
        }
        TransportError::Unreachable(err.to_string())
    }
}

impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn send_request_vote<'a>(
        &'a self,
        peer_address: &'a str,
        args: &'a RequestVoteArgs,
    ) -> BoxFuture<'a, Result<RequestVoteReply, TransportError>> {
        Box::pin(self.post_json(peer_address, REQUEST_VOTE_PATH, args))
    }

    fn send_append_entries<'a>(
        &'a self,
        peer_address: &'a str,
        args: &'a AppendEntriesArgs,
    ) -> BoxFuture<'a, Result<AppendEntriesReply, TransportError>> {
        Box::pin(self.post_json(peer_address, APPEND_ENTRIES_PATH, args))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, method, path},
    };

    use super::*;

    fn peer_address(server: &MockServer) -> String {
        server.address().to_string()
    }

    #[tokio::test]
    async fn request_vote_posts_json_and_decodes_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/raft/request_vote"))
            .and(body_json(json!({
                "term": 3,
                "candidate_id": "n1",
                "last_log_index": 10,
                "last_log_term": 2,
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"term": 5, "vote_granted": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::try_new(Duration::from_secs(1)).unwrap();
        let args = RequestVoteArgs {
            term: 3,
            candidate_id: "n1".to_string(),
            last_log_index: 10,
            last_log_term: 2,
        };
        let reply = transport
            .send_request_vote(&peer_address(&server), &args)
            .await
            .unwrap();

        assert_eq!(
            reply,
            RequestVoteReply {
                term: Some(5),
                vote_granted: Some(true),
                reason: None,
            }
        );
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/raft/append_entries"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let transport = HttpTransport::try_new(Duration::from_secs(1)).unwrap();
        let err = transport
            .send_append_entries(&peer_address(&server), &AppendEntriesArgs::default())
            .await
            .unwrap_err();

        assert_eq!(err, TransportError::Status(503));
    }

    #[tokio::test]
    async fn malformed_body_is_a_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/raft/append_entries"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let transport = HttpTransport::try_new(Duration::from_secs(1)).unwrap();
        let err = transport
            .send_append_entries(&peer_address(&server), &AppendEntriesArgs::default())
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Protocol(_)), "{err:?}");
    }

    #[tokio::test]
    async fn slow_peer_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/raft/request_vote"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"term": 1, "vote_granted": true}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::try_new(Duration::from_millis(50)).unwrap();
        let err = transport
            .send_request_vote(&peer_address(&server), &RequestVoteArgs::default())
            .await
            .unwrap_err();

        assert_eq!(err, TransportError::Timeout(Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::try_new(Duration::from_secs(1)).unwrap();
        let err = transport
            .send_request_vote(&addr.to_string(), &RequestVoteArgs::default())
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Unreachable(_)), "{err:?}");
    }
}
