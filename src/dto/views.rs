use std::time::SystemTime;

use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    config::AppConfig,
    dto::{
        ceil_secs,
        common::{FinishReasonDto, PlayerPhaseDto, QuizModeDto, SessionStatusDto},
        format_system_time,
    },
    state::{
        game::{GameSession, PlayerRecord},
        leaderboard::{Standing, rank},
        quiz::Question,
        state_machine::{QuizMode, SessionStatus},
    },
};

/// One leaderboard line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct StandingView {
    pub position: usize,
    pub name: String,
    pub score: u32,
}

impl From<Standing> for StandingView {
    fn from(value: Standing) -> Self {
        Self {
            position: value.position,
            name: value.name,
            score: value.score,
        }
    }
}

fn standings(session: &GameSession) -> Vec<StandingView> {
    rank(&session.players).into_iter().map(Into::into).collect()
}

/// Question as the host sees it, answer included.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HostQuestionView {
    pub index: usize,
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

/// Question as a player sees it; the answer is only present once revealed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerQuestionView {
    pub index: usize,
    pub text: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
}

/// End-of-game recap line.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionSummaryView {
    pub index: usize,
    pub text: String,
    pub correct_answer: String,
}

fn summary(questions: &[Question]) -> Vec<QuestionSummaryView> {
    questions
        .iter()
        .enumerate()
        .map(|(index, question)| QuestionSummaryView {
            index,
            text: question.text.clone(),
            correct_answer: question.correct_answer.clone(),
        })
        .collect()
}

/// Everything the host screen renders, computed against server time.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HostSessionView {
    pub pin: String,
    pub host_name: String,
    pub mode: QuizModeDto,
    pub status: SessionStatusDto,
    pub current_question_index: i32,
    pub question_count: usize,
    pub current_question: Option<HostQuestionView>,
    /// Seconds left in the current answer window (timed games).
    pub time_remaining_secs: Option<u64>,
    pub time_per_question_secs: Option<u32>,
    pub player_count: usize,
    /// Players done with the current question.
    pub answered_count: usize,
    pub leaderboard: Vec<StandingView>,
    pub answer_revealed: bool,
    pub finish_reason: Option<FinishReasonDto>,
    /// Every question with its answer, once finished.
    pub summary: Option<Vec<QuestionSummaryView>>,
    pub join_url: String,
    pub poll_after_ms: u64,
    pub created_at: String,
    pub updated_at: String,
}

impl HostSessionView {
    pub fn new(session: &GameSession, config: &AppConfig, now: SystemTime) -> Self {
        let current_question = session
            .current_question()
            .map(|(index, question)| HostQuestionView {
                index,
                text: question.text.clone(),
                options: question.options.clone(),
                correct_answer: question.correct_answer.clone(),
            });
        let time_remaining_secs = current_question
            .as_ref()
            .and_then(|question| session.time_remaining(question.index, now))
            .map(ceil_secs);
        let finished = session.status == SessionStatus::Finished;

        Self {
            pin: session.pin.clone(),
            host_name: session.host_name.clone(),
            mode: session.mode.into(),
            status: session.status.into(),
            current_question_index: session.current_question_index,
            question_count: session.questions.len(),
            current_question,
            time_remaining_secs,
            time_per_question_secs: session.time_per_question_secs,
            player_count: session.players.len(),
            answered_count: session.answered_current_count(),
            leaderboard: standings(session),
            answer_revealed: session.answer_revealed,
            finish_reason: session.finish_reason.map(Into::into),
            summary: finished.then(|| summary(&session.questions)),
            join_url: config.join_url(&session.pin),
            poll_after_ms: config.poll_interval.as_millis() as u64,
            created_at: format_system_time(session.created_at),
            updated_at: format_system_time(session.updated_at),
        }
    }
}

/// Final placement of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct RankView {
    pub position: usize,
    pub of: usize,
}

/// Everything a player screen renders, computed against server time.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerView {
    pub pin: String,
    pub name: String,
    pub mode: QuizModeDto,
    pub status: SessionStatusDto,
    pub phase: PlayerPhaseDto,
    pub score: u32,
    pub question_count: usize,
    pub question: Option<PlayerQuestionView>,
    pub time_remaining_secs: Option<u64>,
    /// The previous question closed before this player answered it.
    pub missed_last: bool,
    pub rank: Option<RankView>,
    pub leaderboard: Option<Vec<StandingView>>,
    pub poll_after_ms: u64,
}

impl PlayerView {
    /// View for `name`; `None` when the player never joined.
    pub fn new(
        session: &GameSession,
        name: &str,
        config: &AppConfig,
        now: SystemTime,
    ) -> Option<Self> {
        let record = session.players.get(name)?;
        let phase = player_phase(session, record);

        let question = match phase {
            PlayerPhaseDto::Answering => session
                .next_question_for(name)
                .and_then(|index| question_view(session, index, false)),
            PlayerPhaseDto::WaitingForNext => session
                .current_question()
                .and_then(|(index, _)| question_view(session, index, session.answer_revealed)),
            _ => None,
        };
        let time_remaining_secs = match (phase, &question) {
            (PlayerPhaseDto::Answering, Some(question)) => session
                .time_remaining(question.index, now)
                .map(ceil_secs),
            _ => None,
        };

        let (rank, leaderboard) = if session.status == SessionStatus::Finished {
            let board = standings(session);
            let position = board
                .iter()
                .find(|standing| standing.name == name)
                .map(|standing| standing.position);
            let rank = position.map(|position| RankView {
                position,
                of: board.len(),
            });
            (rank, Some(board))
        } else {
            (None, None)
        };

        Some(Self {
            pin: session.pin.clone(),
            name: name.to_owned(),
            mode: session.mode.into(),
            status: session.status.into(),
            phase,
            score: record.score,
            question_count: session.questions.len(),
            question,
            time_remaining_secs,
            missed_last: missed_last(session, record),
            rank,
            leaderboard,
            poll_after_ms: config.poll_interval.as_millis() as u64,
        })
    }
}

fn question_view(
    session: &GameSession,
    index: usize,
    with_answer: bool,
) -> Option<PlayerQuestionView> {
    session.questions.get(index).map(|question| PlayerQuestionView {
        index,
        text: question.text.clone(),
        options: question.options.clone(),
        correct_answer: with_answer.then(|| question.correct_answer.clone()),
    })
}

fn player_phase(session: &GameSession, record: &PlayerRecord) -> PlayerPhaseDto {
    match session.status {
        SessionStatus::Waiting => PlayerPhaseDto::WaitingForStart,
        SessionStatus::Finished => PlayerPhaseDto::Finished,
        SessionStatus::InProgress => match session.mode {
            QuizMode::InstructorPaced => {
                if record.last_answered_index < session.current_question_index {
                    PlayerPhaseDto::Answering
                } else {
                    PlayerPhaseDto::WaitingForNext
                }
            }
            QuizMode::TimedPaced => {
                if ((record.last_answered_index + 1) as usize) < session.questions.len() {
                    PlayerPhaseDto::Answering
                } else {
                    PlayerPhaseDto::Done
                }
            }
        },
    }
}

fn missed_last(session: &GameSession, record: &PlayerRecord) -> bool {
    match session.mode {
        // The previous question went by while the player still had it open.
        QuizMode::InstructorPaced => {
            session.status == SessionStatus::InProgress
                && session.current_question_index > 0
                && record.last_answered_index < session.current_question_index - 1
        }
        QuizMode::TimedPaced => usize::try_from(record.last_answered_index)
            .is_ok_and(|last| !record.answers.contains_key(&last)),
    }
}

/// Outcome of an accepted answer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnswerResponse {
    pub question_index: usize,
    /// Immediate verdict; absent in timed games, which are scored at the end.
    pub correct: Option<bool>,
    pub score: u32,
}

/// Ranked players of a game.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    pub pin: String,
    pub status: SessionStatusDto,
    /// False while timed answers are still waiting for end-of-game scoring.
    pub scores_final: bool,
    pub entries: Vec<StandingView>,
}

impl From<&GameSession> for LeaderboardResponse {
    fn from(session: &GameSession) -> Self {
        Self {
            pin: session.pin.clone(),
            status: session.status.into(),
            scores_final: session.mode == QuizMode::InstructorPaced
                || session.status == SessionStatus::Finished,
            entries: standings(session),
        }
    }
}

/// Data used to pre-fill the join form from a shared link.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JoinPrefillResponse {
    /// Normalised pin, absent when the link carried none or a malformed one.
    pub pin: Option<String>,
    /// Whether a game with this pin currently accepts players.
    pub joinable: bool,
    pub status: Option<SessionStatusDto>,
}

/// Parsed quiz summary shown before creating a game.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuizPreviewResponse {
    pub question_count: usize,
    pub questions: Vec<QuizPreviewItem>,
}

/// One parsed question.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuizPreviewItem {
    pub text: String,
    pub option_count: usize,
}

impl From<&[Question]> for QuizPreviewResponse {
    fn from(questions: &[Question]) -> Self {
        Self {
            question_count: questions.len(),
            questions: questions
                .iter()
                .map(|question| QuizPreviewItem {
                    text: question.text.clone(),
                    option_count: question.options.len(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    const GRACE: Duration = Duration::from_secs(1);

    fn t0() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn game(mode: QuizMode, count: usize) -> GameSession {
        let questions = (0..count)
            .map(|index| Question {
                text: format!("q{index}"),
                options: vec!["yes".into(), "no".into()],
                correct_answer: "yes".into(),
            })
            .collect();
        let time = (mode == QuizMode::TimedPaced).then_some(10);
        let mut session = GameSession::create(
            "AB12".into(),
            "host".into(),
            questions,
            mode,
            time,
            t0(),
            &mut StdRng::seed_from_u64(9),
        )
        .unwrap();
        session.join("Alice", t0()).unwrap();
        session.join("Bob", t0()).unwrap();
        session
    }

    #[test]
    fn player_never_sees_the_answer_before_reveal() {
        let config = AppConfig::new("pw");
        let mut session = game(QuizMode::InstructorPaced, 2);
        session.start(t0()).unwrap();

        let view = PlayerView::new(&session, "Alice", &config, t0()).unwrap();
        assert_eq!(view.phase, PlayerPhaseDto::Answering);
        assert!(view.question.unwrap().correct_answer.is_none());

        session.submit_answer("Alice", 0, "yes", t0(), GRACE).unwrap();
        let view = PlayerView::new(&session, "Alice", &config, t0()).unwrap();
        assert_eq!(view.phase, PlayerPhaseDto::WaitingForNext);
        assert!(view.question.unwrap().correct_answer.is_none());

        session.answer_revealed = true;
        let view = PlayerView::new(&session, "Alice", &config, t0()).unwrap();
        assert_eq!(
            view.question.unwrap().correct_answer.as_deref(),
            Some("yes")
        );
    }

    #[test]
    fn instructor_player_who_skipped_is_flagged() {
        let config = AppConfig::new("pw");
        let mut session = game(QuizMode::InstructorPaced, 3);
        session.start(t0()).unwrap();
        session.submit_answer("Alice", 0, "yes", t0(), GRACE).unwrap();
        session.advance(None).unwrap();

        let alice = PlayerView::new(&session, "Alice", &config, t0()).unwrap();
        let bob = PlayerView::new(&session, "Bob", &config, t0()).unwrap();
        assert!(!alice.missed_last);
        assert!(bob.missed_last);
        assert_eq!(bob.phase, PlayerPhaseDto::Answering);
    }

    #[test]
    fn timed_player_view_counts_down_their_own_question() {
        let config = AppConfig::new("pw");
        let mut session = game(QuizMode::TimedPaced, 2);
        session.start(t0()).unwrap();
        session
            .submit_answer("Alice", 0, "yes", t0() + Duration::from_secs(2), GRACE)
            .unwrap();

        let now = t0() + Duration::from_secs(3);
        let alice = PlayerView::new(&session, "Alice", &config, now).unwrap();
        assert_eq!(alice.phase, PlayerPhaseDto::Answering);
        assert_eq!(alice.question.as_ref().unwrap().index, 1);
        assert_eq!(alice.time_remaining_secs, Some(17));

        session.expire_if_timed_out(t0() + Duration::from_secs(11), GRACE);
        let bob = PlayerView::new(&session, "Bob", &config, now).unwrap();
        assert!(bob.missed_last);
        assert_eq!(bob.question.unwrap().index, 1);
    }

    #[test]
    fn finished_views_carry_rank_and_summary() {
        let config = AppConfig::new("pw");
        let mut session = game(QuizMode::InstructorPaced, 1);
        session.start(t0()).unwrap();
        session.submit_answer("Bob", 0, "yes", t0(), GRACE).unwrap();
        session.advance(None).unwrap();

        let bob = PlayerView::new(&session, "Bob", &config, t0()).unwrap();
        assert_eq!(bob.phase, PlayerPhaseDto::Finished);
        assert_eq!(bob.rank, Some(RankView { position: 1, of: 2 }));
        let alice = PlayerView::new(&session, "Alice", &config, t0()).unwrap();
        assert_eq!(alice.rank, Some(RankView { position: 2, of: 2 }));

        let host = HostSessionView::new(&session, &config, t0());
        assert_eq!(host.status, SessionStatusDto::Finished);
        assert_eq!(host.summary.unwrap().len(), 1);
        assert_eq!(host.join_url, "http://localhost:8080/join?pin=AB12");
        assert_eq!(host.poll_after_ms, 1_500);
        assert!(PlayerView::new(&session, "Nobody", &config, t0()).is_none());
    }
}
