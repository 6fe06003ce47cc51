use serde::{Deserialize, Serialize};

/// Raft log entry as seen by the transport.
///
/// Entries are opaque here: the consensus engine decides their shape, this layer only carries
/// them between peers.
pub type LogEntry = serde_json::Value;

/// RequestVote arguments, sent by a candidate to every peer during an election.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteArgs {
    pub term: u64,
    pub candidate_id: String,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

/// AppendEntries arguments, sent by the leader for replication and as heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesArgs {
    pub term: u64,
    pub leader_id: String,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    /// Empty for heartbeat.
    pub entries: Vec<LogEntry>,
    pub leader_commit: u64,
}

impl AppendEntriesArgs {
    pub fn is_heartbeat(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What a RequestVote handler returns; serialized verbatim onto the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteResult {
    pub term: u64,
    pub vote_granted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RequestVoteResult {
    pub fn rejected(term: u64, reason: impl Into<String>) -> Self {
        Self {
            term,
            vote_granted: false,
            reason: Some(reason.into()),
        }
    }
}

/// What an AppendEntries handler returns; serialized verbatim onto the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesResult {
    pub term: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AppendEntriesResult {
    pub fn rejected(term: u64, reason: impl Into<String>) -> Self {
        Self {
            term,
            success: false,
            reason: Some(reason.into()),
        }
    }
}

/// A RequestVote reply as decoded by the client.
///
/// Every field is optional: peers are allowed to omit them and the client fills in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteReply {
    #[serde(default)]
    pub term: Option<u64>,
    #[serde(default)]
    pub vote_granted: Option<bool>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// An AppendEntries reply as decoded by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesReply {
    #[serde(default)]
    pub term: Option<u64>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Uniform outcome of one logical RPC, handed back to the consensus engine.
///
/// `outcome` is `vote_granted` for RequestVote and `success` for AppendEntries. Transport
/// failures surface as `outcome == false` with a human-readable `reason`; callers treat them
/// exactly like an explicit rejection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub term: u64,
    pub outcome: bool,
    pub reason: Option<String>,
}

impl RpcResponse {
    pub fn failure(term: u64, reason: impl Into<String>) -> Self {
        Self {
            term,
            outcome: false,
            reason: Some(reason.into()),
        }
    }

    /// `term` is the caller's term, used when the peer did not report one.
    pub fn from_vote_reply(term: u64, reply: RequestVoteReply) -> Self {
        Self {
            term: reply.term.unwrap_or(term),
            outcome: reply.vote_granted.unwrap_or(false),
            reason: reply.reason,
        }
    }

    pub fn from_append_reply(term: u64, reply: AppendEntriesReply) -> Self {
        Self {
            term: reply.term.unwrap_or(term),
            outcome: reply.success.unwrap_or(false),
            reason: reply.reason,
        }
    }
}

impl From<RequestVoteResult> for RequestVoteReply {
    fn from(value: RequestVoteResult) -> Self {
        Self {
            term: Some(value.term),
            vote_granted: Some(value.vote_granted),
            reason: value.reason,
        }
    }
}

impl From<AppendEntriesResult> for AppendEntriesReply {
    fn from(value: AppendEntriesResult) -> Self {
        Self {
            term: Some(value.term),
            success: Some(value.success),
            reason: value.reason,
        }
    }
}

/// Body of `GET /raft/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub node_id: String,
}

impl HealthStatus {
    pub fn healthy(node_id: impl Into<String>) -> Self {
        Self {
            status: "healthy".to_string(),
            node_id: node_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn reply_without_term_falls_back_to_caller_term() {
        let reply: RequestVoteReply = serde_json::from_value(json!({"vote_granted": true})).unwrap();
        let resp = RpcResponse::from_vote_reply(9, reply);
        assert_eq!(
            resp,
            RpcResponse {
                term: 9,
                outcome: true,
                reason: None,
            }
        );
    }

    #[test]
    fn reply_without_outcome_is_negative() {
        let reply: AppendEntriesReply =
            serde_json::from_value(json!({"term": 4, "reason": "stale"})).unwrap();
        let resp = RpcResponse::from_append_reply(2, reply);
        assert_eq!(resp.term, 4);
        assert!(!resp.outcome);
        assert_eq!(resp.reason.as_deref(), Some("stale"));
    }

    #[test]
    fn peer_reported_term_wins() {
        let reply: RequestVoteReply =
            serde_json::from_value(json!({"term": 5, "vote_granted": true})).unwrap();
        assert_eq!(
            RpcResponse::from_vote_reply(3, reply),
            RpcResponse {
                term: 5,
                outcome: true,
                reason: None,
            }
        );
    }

    #[test]
    fn handler_result_omits_absent_reason() {
        let v = serde_json::to_value(AppendEntriesResult {
            term: 3,
            success: true,
            reason: None,
        })
        .unwrap();
        assert_eq!(v, json!({"term": 3, "success": true}));
    }

    #[test]
    fn heartbeat_has_no_entries() {
        let mut args = AppendEntriesArgs::default();
        assert!(args.is_heartbeat());
        args.entries.push(json!({"index": 1, "term": 1, "command": "noop"}));
        assert!(!args.is_heartbeat());
    }
}
