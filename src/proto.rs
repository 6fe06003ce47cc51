pub mod raft {
    tonic::include_proto!("raftnet.raft");
}

use crate::types::{
    AppendEntriesArgs, AppendEntriesReply, AppendEntriesResult, RequestVoteArgs, RequestVoteReply,
    RequestVoteResult,
};

impl From<&RequestVoteArgs> for raft::RequestVoteRequest {
    fn from(value: &RequestVoteArgs) -> Self {
        Self {
            term: value.term,
            candidate_id: value.candidate_id.clone(),
            last_log_index: value.last_log_index,
            last_log_term: value.last_log_term,
        }
    }
}

impl From<raft::RequestVoteRequest> for RequestVoteArgs {
    fn from(value: raft::RequestVoteRequest) -> Self {
        Self {
            term: value.term,
            candidate_id: value.candidate_id,
            last_log_index: value.last_log_index,
            last_log_term: value.last_log_term,
        }
    }
}

impl TryFrom<&AppendEntriesArgs> for raft::AppendEntriesRequest {
    type Error = serde_json::Error;

    fn try_from(value: &AppendEntriesArgs) -> Result<Self, Self::Error> {
        let entries_json = value
            .entries
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            term: value.term,
            leader_id: value.leader_id.clone(),
            prev_log_index: value.prev_log_index,
            prev_log_term: value.prev_log_term,
            entries_json,
            leader_commit: value.leader_commit,
        })
    }
}

impl TryFrom<raft::AppendEntriesRequest> for AppendEntriesArgs {
    type Error = serde_json::Error;

    fn try_from(value: raft::AppendEntriesRequest) -> Result<Self, Self::Error> {
        let entries = value
            .entries_json
            .iter()
            .map(|raw| serde_json::from_str(raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            term: value.term,
            leader_id: value.leader_id,
            prev_log_index: value.prev_log_index,
            prev_log_term: value.prev_log_term,
            entries,
            leader_commit: value.leader_commit,
        })
    }
}

impl From<raft::RequestVoteResponse> for RequestVoteReply {
    fn from(value: raft::RequestVoteResponse) -> Self {
        Self {
            term: value.term,
            vote_granted: value.vote_granted,
            reason: value.reason,
        }
    }
}

impl From<RequestVoteResult> for raft::RequestVoteResponse {
    fn from(value: RequestVoteResult) -> Self {
        Self {
            term: Some(value.term),
            vote_granted: Some(value.vote_granted),
            reason: value.reason,
        }
    }
}

impl From<raft::AppendEntriesResponse> for AppendEntriesReply {
    fn from(value: raft::AppendEntriesResponse) -> Self {
        Self {
            term: value.term,
            success: value.success,
            reason: value.reason,
        }
    }
}

impl From<AppendEntriesResult> for raft::AppendEntriesResponse {
    fn from(value: AppendEntriesResult) -> Self {
        Self {
            term: Some(value.term),
            success: Some(value.success),
            reason: value.reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn append_entries_request_carries_entries_as_json_documents() {
        let args = AppendEntriesArgs {
            term: 2,
            leader_id: "n1".to_string(),
            prev_log_index: 4,
            prev_log_term: 1,
            entries: vec![json!({"index": 5, "term": 2, "command": "set x=1"})],
            leader_commit: 4,
        };

        let req = raft::AppendEntriesRequest::try_from(&args).unwrap();
        assert_eq!(req.entries_json.len(), 1);

        let back = AppendEntriesArgs::try_from(req).unwrap();
        assert_eq!(back, args);
    }

    #[test]
    fn malformed_entry_is_rejected() {
        let req = raft::AppendEntriesRequest {
            entries_json: vec!["{not json".to_string()],
            ..Default::default()
        };
        assert!(AppendEntriesArgs::try_from(req).is_err());
    }

    #[test]
    fn missing_response_fields_stay_missing() {
        let reply = RequestVoteReply::from(raft::RequestVoteResponse::default());
        assert_eq!(reply, RequestVoteReply::default());
    }
}
