use std::{collections::BTreeMap, time::SystemTime};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::state::{
    game::{GameSession, PlayerRecord},
    quiz::Question,
    state_machine::{FinishReason, QuizMode, SessionStatus},
};

/// Persisted form of a game session, one document per pin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Join pin, also the document key.
    pub pin: String,
    /// Name given by the host.
    pub host_name: String,
    /// Pacing mode.
    pub mode: QuizMode,
    /// Seconds per question (timed games).
    #[serde(default)]
    pub time_per_question_secs: Option<u32>,
    /// Questions in play order.
    pub questions: Vec<QuestionEntity>,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Current question pointer, -1 before start.
    pub current_question_index: i32,
    /// Server time the timed schedule started.
    #[serde(default)]
    pub question_started_at: Option<SystemTime>,
    /// Players in join order.
    pub players: Vec<PlayerEntity>,
    /// Whether the host reveals the current answer.
    #[serde(default)]
    pub answer_revealed: bool,
    /// Why the game ended.
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
    /// Creation time.
    pub created_at: SystemTime,
    /// Last write time.
    pub updated_at: SystemTime,
}

/// Stored question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Stem.
    pub text: String,
    /// Options in display order.
    pub options: Vec<String>,
    /// Correct option.
    pub correct_answer: String,
}

/// Stored player progress.
///
/// Kept as a list rather than a map so player names never end up as document keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Case-sensitive unique name.
    pub name: String,
    /// Credited score.
    pub score: u32,
    /// Last answered or missed question, -1 before any.
    pub last_answered_index: i32,
    /// Raw timed-mode submissions.
    #[serde(default)]
    pub answers: Vec<AnswerEntity>,
    /// Join sequence number.
    pub join_order: u32,
    /// Join time.
    pub joined_at: SystemTime,
}

/// One recorded submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerEntity {
    /// Question index.
    pub question_index: u32,
    /// Submitted option text.
    pub option: String,
}

/// Blind partial write for fields that carry no invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPatch {
    /// New value for the reveal flag.
    pub answer_revealed: Option<bool>,
    /// Time of the write.
    pub updated_at: SystemTime,
}

impl SessionPatch {
    /// Copy the patched fields into `session`.
    pub fn apply(&self, session: &mut SessionEntity) {
        if let Some(revealed) = self.answer_revealed {
            session.answer_revealed = revealed;
        }
        session.updated_at = self.updated_at;
    }
}

impl From<Question> for QuestionEntity {
    fn from(value: Question) -> Self {
        Self {
            text: value.text,
            options: value.options,
            correct_answer: value.correct_answer,
        }
    }
}

impl From<QuestionEntity> for Question {
    fn from(value: QuestionEntity) -> Self {
        Self {
            text: value.text,
            options: value.options,
            correct_answer: value.correct_answer,
        }
    }
}

impl From<(String, PlayerRecord)> for PlayerEntity {
    fn from((name, record): (String, PlayerRecord)) -> Self {
        Self {
            name,
            score: record.score,
            last_answered_index: record.last_answered_index,
            answers: record
                .answers
                .into_iter()
                .map(|(index, option)| AnswerEntity {
                    question_index: index as u32,
                    option,
                })
                .collect(),
            join_order: record.join_order,
            joined_at: record.joined_at,
        }
    }
}

impl From<PlayerEntity> for (String, PlayerRecord) {
    fn from(value: PlayerEntity) -> Self {
        let answers: BTreeMap<usize, String> = value
            .answers
            .into_iter()
            .map(|answer| (answer.question_index as usize, answer.option))
            .collect();
        (
            value.name,
            PlayerRecord {
                score: value.score,
                last_answered_index: value.last_answered_index,
                answers,
                join_order: value.join_order,
                joined_at: value.joined_at,
            },
        )
    }
}

impl From<GameSession> for SessionEntity {
    fn from(value: GameSession) -> Self {
        Self {
            pin: value.pin,
            host_name: value.host_name,
            mode: value.mode,
            time_per_question_secs: value.time_per_question_secs,
            questions: value.questions.into_iter().map(Into::into).collect(),
            status: value.status,
            current_question_index: value.current_question_index,
            question_started_at: value.question_started_at,
            players: value.players.into_iter().map(Into::into).collect(),
            answer_revealed: value.answer_revealed,
            finish_reason: value.finish_reason,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<SessionEntity> for GameSession {
    fn from(value: SessionEntity) -> Self {
        let players: IndexMap<String, PlayerRecord> =
            value.players.into_iter().map(Into::into).collect();
        Self {
            pin: value.pin,
            host_name: value.host_name,
            mode: value.mode,
            time_per_question_secs: value.time_per_question_secs,
            questions: value.questions.into_iter().map(Into::into).collect(),
            status: value.status,
            current_question_index: value.current_question_index,
            question_started_at: value.question_started_at,
            players,
            answer_revealed: value.answer_revealed,
            finish_reason: value.finish_reason,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn session_survives_the_entity_mapping() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let question = Question {
            text: "2 + 2?".into(),
            options: vec!["3".into(), "4".into()],
            correct_answer: "4".into(),
        };
        let mut session = GameSession::create(
            "QZ42".into(),
            "host".into(),
            vec![question],
            QuizMode::TimedPaced,
            Some(20),
            now,
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();
        session.join("zoe", now).unwrap();
        session.join("Adam", now).unwrap();
        session.start(now).unwrap();
        session
            .submit_answer("Adam", 0, "4", now, Duration::from_secs(1))
            .unwrap();

        let entity = SessionEntity::from(session.clone());
        assert_eq!(entity.players[0].name, "zoe");
        assert_eq!(entity.players[1].answers[0].option, "4");

        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["mode"], "timed_paced");
        assert_eq!(json["status"], "in_progress");

        let decoded: SessionEntity = serde_json::from_value(json).unwrap();
        assert_eq!(GameSession::from(decoded), session);
    }

    #[test]
    fn patch_only_touches_named_fields() {
        let now = SystemTime::UNIX_EPOCH;
        let mut entity = SessionEntity::from(
            GameSession::create(
                "AAAA".into(),
                "h".into(),
                vec![Question {
                    text: "q".into(),
                    options: vec!["a".into(), "b".into()],
                    correct_answer: "a".into(),
                }],
                QuizMode::InstructorPaced,
                None,
                now,
                &mut StdRng::seed_from_u64(1),
            )
            .unwrap(),
        );
        let before = entity.clone();
        let later = now + Duration::from_secs(5);

        SessionPatch {
            answer_revealed: Some(true),
            updated_at: later,
        }
        .apply(&mut entity);

        assert!(entity.answer_revealed);
        assert_eq!(entity.updated_at, later);
        assert_eq!(entity.players, before.players);
        assert_eq!(entity.status, before.status);
    }
}
