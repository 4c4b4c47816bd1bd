use serde::{Deserialize, Serialize};

use crate::dao::models::SessionEntity;

pub const SESSION_PREFIX: &str = "session::";

pub fn session_doc_id(pin: &str) -> String {
    format!("{SESSION_PREFIX}{pin}")
}

/// Session document as stored in CouchDB; `_rev` is the compare-and-swap token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchSessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub session: SessionEntity,
}

impl CouchSessionDocument {
    pub fn new(session: SessionEntity, rev: Option<String>) -> Self {
        Self {
            id: session_doc_id(&session.pin),
            rev,
            session,
        }
    }
}

/// Body returned by CouchDB after a successful write.
#[derive(Debug, Deserialize)]
pub struct WriteResponse {
    pub rev: String,
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::state::state_machine::{QuizMode, SessionStatus};

    #[test]
    fn document_flattens_the_session_next_to_couch_fields() {
        let session = SessionEntity {
            pin: "AB12".into(),
            host_name: "host".into(),
            mode: QuizMode::InstructorPaced,
            time_per_question_secs: None,
            questions: vec![],
            status: SessionStatus::Waiting,
            current_question_index: -1,
            question_started_at: None,
            players: vec![],
            answer_revealed: false,
            finish_reason: None,
            created_at: SystemTime::UNIX_EPOCH,
            updated_at: SystemTime::UNIX_EPOCH,
        };

        let fresh = serde_json::to_value(CouchSessionDocument::new(session.clone(), None)).unwrap();
        assert_eq!(fresh["_id"], "session::AB12");
        assert!(fresh.get("_rev").is_none());
        assert_eq!(fresh["pin"], "AB12");

        let stored = serde_json::to_value(CouchSessionDocument::new(session, Some("3-abc".into())))
            .unwrap();
        let decoded: CouchSessionDocument = serde_json::from_value(stored).unwrap();
        assert_eq!(decoded.rev.as_deref(), Some("3-abc"));
        assert_eq!(decoded.session.pin, "AB12");
    }
}
