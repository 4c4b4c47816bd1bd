use std::{
    collections::BTreeMap,
    time::{Duration, SystemTime},
};

use indexmap::IndexMap;
use rand::{Rng, seq::SliceRandom};
use thiserror::Error;

use crate::state::{
    leaderboard::finalize_scores,
    quiz::Question,
    state_machine::{
        FinishReason, InvalidTransition, QuizMode, SessionEvent, SessionStatus, Transition,
    },
};

/// Time limit applied when a timed document lost its configured value.
pub const DEFAULT_TIME_PER_QUESTION_SECS: u32 = 60;
/// Marker stored in `last_answered_index` before the first answer.
pub const NOT_ANSWERED: i32 = -1;
/// Number of characters in a join pin.
pub const PIN_LENGTH: usize = 4;
const PIN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Draw a random pin; uniqueness is enforced by the store.
pub fn generate_pin<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..PIN_LENGTH)
        .map(|_| char::from(PIN_ALPHABET[rng.random_range(0..PIN_ALPHABET.len())]))
        .collect()
}

/// Whether `pin` is already in canonical form.
pub fn is_valid_pin(pin: &str) -> bool {
    pin.len() == PIN_LENGTH && pin.bytes().all(|byte| PIN_ALPHABET.contains(&byte))
}

/// Per-player progress tracked inside a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    /// Number of correct answers credited so far.
    pub score: u32,
    /// Last question the player answered or missed, [`NOT_ANSWERED`] before any.
    pub last_answered_index: i32,
    /// Raw submissions keyed by question index (timed games only).
    pub answers: BTreeMap<usize, String>,
    /// Position in the join sequence, used to break score ties.
    pub join_order: u32,
    /// Server time of the join.
    pub joined_at: SystemTime,
}

impl PlayerRecord {
    /// Fresh record for a player who just joined.
    pub fn new(join_order: u32, joined_at: SystemTime) -> Self {
        Self {
            score: 0,
            last_answered_index: NOT_ANSWERED,
            answers: BTreeMap::new(),
            join_order,
            joined_at,
        }
    }
}

/// Aggregate for one game, identified by its pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    /// 4-character join code.
    pub pin: String,
    /// Name the host gave when creating the game.
    pub host_name: String,
    /// Pacing of the game.
    pub mode: QuizMode,
    /// Seconds per question, set for timed games only.
    pub time_per_question_secs: Option<u32>,
    /// Questions in their shuffled, permanent order.
    pub questions: Vec<Question>,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Question shown to everyone (instructor) or open on the schedule (timed); -1 before start.
    pub current_question_index: i32,
    /// Server time at which the timed schedule began.
    pub question_started_at: Option<SystemTime>,
    /// Players keyed by their case-sensitive name, in join order.
    pub players: IndexMap<String, PlayerRecord>,
    /// Whether the host currently shows the correct answer to players.
    pub answer_revealed: bool,
    /// Set once the game is finished.
    pub finish_reason: Option<FinishReason>,
    /// Server time of creation.
    pub created_at: SystemTime,
    /// Server time of the last write.
    pub updated_at: SystemTime,
}

/// Whether an operation modified the session and must be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The session changed.
    Changed,
    /// Nothing to write.
    Unchanged,
}

impl From<bool> for Outcome {
    fn from(changed: bool) -> Self {
        if changed {
            Outcome::Changed
        } else {
            Outcome::Unchanged
        }
    }
}

/// Acknowledgement of an accepted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerReceipt {
    /// Question the answer was recorded for.
    pub question_index: usize,
    /// Immediate verdict (instructor games); `None` when scoring is deferred.
    pub correct: Option<bool>,
}

/// Rule violations raised by session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A game needs at least one question.
    #[error("a game requires at least one question")]
    EmptyQuiz,
    /// Timed games need a positive time limit.
    #[error("timed games require a positive time per question")]
    MissingTimeLimit,
    /// Another player already uses this name.
    #[error("the name `{0}` is already taken")]
    NameTaken(String),
    /// No player with this name joined the game.
    #[error("player `{0}` is not part of this game")]
    UnknownPlayer(String),
    /// The player already answered this question.
    #[error("question {index} was already answered")]
    AlreadyAnswered {
        /// Question index.
        index: i32,
    },
    /// The submission targets another question than the one expected.
    #[error("answer is for question {got} but question {expected} is expected")]
    QuestionMismatch {
        /// Index the player should answer.
        expected: i32,
        /// Index the player sent.
        got: i32,
    },
    /// The submitted option is not offered by the question.
    #[error("`{0}` is not an option of this question")]
    UnknownOption(String),
    /// The answer window of the question is closed.
    #[error("time is up for question {index}")]
    QuestionExpired {
        /// Question index.
        index: usize,
    },
    /// A game cannot start without players.
    #[error("cannot start a game without at least one player")]
    NoPlayers,
    /// Answers are only accepted once the game started.
    #[error("the game has not started yet")]
    NotStarted,
    /// The game is over; standings are frozen.
    #[error("the game is already finished")]
    GameFinished,
    /// The operation does not exist for this pacing mode.
    #[error("`{operation}` is not available in {mode:?} games")]
    WrongMode {
        /// Rejected operation.
        operation: &'static str,
        /// Pacing of the game.
        mode: QuizMode,
    },
    /// Status transition rejected by the state machine.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

impl GameSession {
    /// Build a waiting session whose questions are shuffled once and for all.
    pub fn create<R: Rng + ?Sized>(
        pin: String,
        host_name: String,
        mut questions: Vec<Question>,
        mode: QuizMode,
        time_per_question_secs: Option<u32>,
        now: SystemTime,
        rng: &mut R,
    ) -> Result<Self, SessionError> {
        if questions.is_empty() {
            return Err(SessionError::EmptyQuiz);
        }

        let time_per_question_secs = match mode {
            QuizMode::InstructorPaced => None,
            QuizMode::TimedPaced => match time_per_question_secs {
                Some(seconds) if seconds > 0 => Some(seconds),
                _ => return Err(SessionError::MissingTimeLimit),
            },
        };

        questions.shuffle(rng);

        Ok(Self {
            pin,
            host_name,
            mode,
            time_per_question_secs,
            questions,
            status: SessionStatus::Waiting,
            current_question_index: -1,
            question_started_at: None,
            players: IndexMap::new(),
            answer_revealed: false,
            finish_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Register a new player with a zero score.
    pub fn join(&mut self, name: &str, now: SystemTime) -> Result<(), SessionError> {
        if self.status == SessionStatus::Finished {
            return Err(SessionError::GameFinished);
        }
        if self.players.contains_key(name) {
            return Err(SessionError::NameTaken(name.to_owned()));
        }

        let join_order = self
            .players
            .values()
            .map(|record| record.join_order + 1)
            .max()
            .unwrap_or(0);
        self.players.insert(name.to_owned(), PlayerRecord::new(join_order, now));
        Ok(())
    }

    /// Reveal the first question.
    pub fn start(&mut self, now: SystemTime) -> Result<Outcome, SessionError> {
        let next = match self.status.on(SessionEvent::Start)? {
            Transition::Replay => return Ok(Outcome::Unchanged),
            Transition::Apply(next) => next,
        };
        if self.players.is_empty() {
            return Err(SessionError::NoPlayers);
        }

        self.status = next;
        self.current_question_index = 0;
        self.answer_revealed = false;
        if self.mode == QuizMode::TimedPaced {
            self.question_started_at = Some(now);
        }
        Ok(Outcome::Changed)
    }

    /// Move everyone to the next question, finishing after the last one.
    ///
    /// `from_index` is the question the host was looking at; when the pointer
    /// already moved past it the call is a replay and changes nothing.
    pub fn advance(&mut self, from_index: Option<i32>) -> Result<Outcome, SessionError> {
        if self.mode != QuizMode::InstructorPaced {
            return Err(SessionError::WrongMode {
                operation: "advance",
                mode: self.mode,
            });
        }
        if let Transition::Replay = self.status.on(SessionEvent::Advance)? {
            return Ok(Outcome::Unchanged);
        }
        if from_index.is_some_and(|from| from != self.current_question_index) {
            return Ok(Outcome::Unchanged);
        }

        self.answer_revealed = false;
        let next = self.current_question_index + 1;
        if next as usize >= self.questions.len() {
            self.close(FinishReason::QuizCompleted);
        } else {
            self.current_question_index = next;
        }
        Ok(Outcome::Changed)
    }

    /// Show or hide the correct answer of the current question.
    ///
    /// `at_index` is the question the host was looking at; once the game moved
    /// past it the call changes nothing.
    pub fn reveal(
        &mut self,
        at_index: Option<i32>,
        revealed: bool,
    ) -> Result<Outcome, SessionError> {
        if self.mode != QuizMode::InstructorPaced {
            return Err(SessionError::WrongMode {
                operation: "reveal",
                mode: self.mode,
            });
        }
        match self.status {
            SessionStatus::Waiting => return Err(SessionError::NotStarted),
            SessionStatus::Finished => return Err(SessionError::GameFinished),
            SessionStatus::InProgress => {}
        }
        if at_index.is_some_and(|at| at != self.current_question_index) {
            return Ok(Outcome::Unchanged);
        }

        let changed = self.answer_revealed != revealed;
        self.answer_revealed = revealed;
        Ok(changed.into())
    }

    /// End the game, finalising timed scores from the recorded answers.
    pub fn finish(&mut self, reason: FinishReason) -> Result<Outcome, SessionError> {
        match self.status.on(SessionEvent::Finish(reason))? {
            Transition::Replay => Ok(Outcome::Unchanged),
            Transition::Apply(_) => {
                self.close(reason);
                Ok(Outcome::Changed)
            }
        }
    }

    fn close(&mut self, reason: FinishReason) {
        self.status = SessionStatus::Finished;
        self.finish_reason = Some(reason);
        self.answer_revealed = false;
        if self.mode == QuizMode::TimedPaced {
            finalize_scores(&self.questions, &mut self.players);
        }
    }

    /// Record a player's answer for `question_index`.
    pub fn submit_answer(
        &mut self,
        name: &str,
        question_index: i32,
        option: &str,
        now: SystemTime,
        grace: Duration,
    ) -> Result<AnswerReceipt, SessionError> {
        match self.status {
            SessionStatus::Waiting => return Err(SessionError::NotStarted),
            SessionStatus::Finished => return Err(SessionError::GameFinished),
            SessionStatus::InProgress => {}
        }

        match self.mode {
            QuizMode::InstructorPaced => self.submit_paced(name, question_index, option),
            QuizMode::TimedPaced => self.submit_timed(name, question_index, option, now, grace),
        }
    }

    fn submit_paced(
        &mut self,
        name: &str,
        question_index: i32,
        option: &str,
    ) -> Result<AnswerReceipt, SessionError> {
        let current = self.current_question_index;
        let record = self
            .players
            .get_mut(name)
            .ok_or_else(|| SessionError::UnknownPlayer(name.to_owned()))?;

        if question_index != current {
            return Err(SessionError::QuestionMismatch {
                expected: current,
                got: question_index,
            });
        }
        if record.last_answered_index >= current {
            return Err(SessionError::AlreadyAnswered { index: current });
        }

        let index = current as usize;
        let question = self
            .questions
            .get(index)
            .ok_or(SessionError::QuestionMismatch {
                expected: current,
                got: question_index,
            })?;
        if !question.offers(option) {
            return Err(SessionError::UnknownOption(option.to_owned()));
        }

        let correct = question.is_correct(option);
        record.last_answered_index = current;
        if correct {
            record.score += 1;
        }

        Ok(AnswerReceipt {
            question_index: index,
            correct: Some(correct),
        })
    }

    fn submit_timed(
        &mut self,
        name: &str,
        question_index: i32,
        option: &str,
        now: SystemTime,
        grace: Duration,
    ) -> Result<AnswerReceipt, SessionError> {
        let elapsed = self.elapsed(now);
        let limit = self.question_limit();
        let record = self
            .players
            .get_mut(name)
            .ok_or_else(|| SessionError::UnknownPlayer(name.to_owned()))?;

        let expected = record.last_answered_index + 1;
        if question_index < expected {
            return Err(SessionError::AlreadyAnswered {
                index: question_index,
            });
        }
        let mismatch = SessionError::QuestionMismatch {
            expected,
            got: question_index,
        };
        if question_index > expected {
            return Err(mismatch);
        }

        let index = expected as usize;
        let question = self.questions.get(index).ok_or(mismatch)?;
        if let (Some(limit), Some(elapsed)) = (limit, elapsed) {
            if elapsed >= answer_deadline(limit, index, grace) {
                return Err(SessionError::QuestionExpired { index });
            }
        }
        if !question.offers(option) {
            return Err(SessionError::UnknownOption(option.to_owned()));
        }

        record.answers.insert(index, option.to_owned());
        record.last_answered_index = expected;

        Ok(AnswerReceipt {
            question_index: index,
            correct: None,
        })
    }

    /// Apply the timed schedule against server time.
    ///
    /// Players whose answer window closed are moved past the question without
    /// credit, the informational pointer follows the schedule, and the game
    /// finishes once every window closed or every player is done.
    pub fn expire_if_timed_out(&mut self, now: SystemTime, grace: Duration) -> Outcome {
        if self.mode != QuizMode::TimedPaced || self.status != SessionStatus::InProgress {
            return Outcome::Unchanged;
        }
        let (Some(limit), Some(elapsed)) = (self.question_limit(), self.elapsed(now)) else {
            return Outcome::Unchanged;
        };

        let total = self.questions.len();
        if total == 0 {
            return Outcome::Unchanged;
        }
        let mut changed = false;

        for record in self.players.values_mut() {
            loop {
                let next = (record.last_answered_index + 1) as usize;
                if next >= total || elapsed < answer_deadline(limit, next, grace) {
                    break;
                }
                record.last_answered_index += 1;
                changed = true;
            }
        }

        let on_schedule = (elapsed.as_nanos() / limit.as_nanos()).min(total as u128 - 1) as i32;
        if on_schedule > self.current_question_index {
            self.current_question_index = on_schedule;
            changed = true;
        }

        let last_window_closed = elapsed >= answer_deadline(limit, total - 1, grace);
        let everyone_done = !self.players.is_empty()
            && self
                .players
                .values()
                .all(|record| (record.last_answered_index + 1) as usize >= total);

        if last_window_closed {
            self.close(FinishReason::TimeExpired);
            changed = true;
        } else if everyone_done {
            self.close(FinishReason::QuizCompleted);
            changed = true;
        }

        changed.into()
    }

    /// Whether a poll at `now` would change the session.
    pub fn needs_expiry(&self, now: SystemTime, grace: Duration) -> bool {
        self.clone().expire_if_timed_out(now, grace) == Outcome::Changed
    }

    /// Per-question limit of timed games.
    pub fn question_limit(&self) -> Option<Duration> {
        match self.mode {
            QuizMode::InstructorPaced => None,
            QuizMode::TimedPaced => {
                let seconds = self
                    .time_per_question_secs
                    .filter(|seconds| *seconds > 0)
                    .unwrap_or(DEFAULT_TIME_PER_QUESTION_SECS);
                Some(Duration::from_secs(u64::from(seconds)))
            }
        }
    }

    /// Time elapsed on the server since the schedule started.
    pub fn elapsed(&self, now: SystemTime) -> Option<Duration> {
        self.question_started_at
            .map(|started| now.duration_since(started).unwrap_or_default())
    }

    /// Countdown shown for question `index`, excluding the grace window.
    pub fn time_remaining(&self, index: usize, now: SystemTime) -> Option<Duration> {
        let limit = self.question_limit()?;
        let elapsed = self.elapsed(now)?;
        Some((limit * (index as u32 + 1)).saturating_sub(elapsed))
    }

    /// Question a player is expected to answer next, if any.
    pub fn next_question_for(&self, name: &str) -> Option<usize> {
        if self.status != SessionStatus::InProgress {
            return None;
        }
        let record = self.players.get(name)?;
        let next = match self.mode {
            QuizMode::InstructorPaced => {
                if record.last_answered_index >= self.current_question_index {
                    return None;
                }
                self.current_question_index
            }
            QuizMode::TimedPaced => record.last_answered_index + 1,
        };
        usize::try_from(next)
            .ok()
            .filter(|index| *index < self.questions.len())
    }

    /// Question currently pointed at, if the game is running.
    pub fn current_question(&self) -> Option<(usize, &Question)> {
        if self.status != SessionStatus::InProgress {
            return None;
        }
        let index = usize::try_from(self.current_question_index).ok()?;
        self.questions.get(index).map(|question| (index, question))
    }

    /// Players who are done with the current question.
    pub fn answered_current_count(&self) -> usize {
        self.players
            .values()
            .filter(|record| record.last_answered_index >= self.current_question_index)
            .count()
    }
}

fn answer_deadline(limit: Duration, index: usize, grace: Duration) -> Duration {
    limit * (index as u32 + 1) + grace
}
