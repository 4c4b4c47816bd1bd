use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of a quiz session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Players can join; no question has been revealed.
    Waiting,
    /// Questions are being played.
    InProgress,
    /// Final standings are frozen.
    Finished,
}

/// Pacing of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizMode {
    /// Everyone sees the same question; the host advances.
    InstructorPaced,
    /// Players advance on their own under a shared per-question time limit.
    TimedPaced,
}

/// Why a session reached [`SessionStatus::Finished`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Every question was played.
    QuizCompleted,
    /// The last answer window closed.
    TimeExpired,
    /// The host ended the game.
    ManualStop,
}

/// Events that drive the session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Host starts the game.
    Start,
    /// Host moves everyone to the next question.
    Advance,
    /// Game ends.
    Finish(FinishReason),
}

/// Error returned when an event cannot be applied from the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// Status the session was in.
    pub from: SessionStatus,
    /// Rejected event.
    pub event: SessionEvent,
}

/// Result of feeding an event to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The event moves (or keeps) the session into this status.
    Apply(SessionStatus),
    /// The event was already applied by an earlier request; nothing to do.
    Replay,
}

impl SessionStatus {
    /// Compute the effect of `event`.
    ///
    /// Replaying an event whose effect is already visible is not an error,
    /// since polling clients race to trigger the same transition.
    pub fn on(self, event: SessionEvent) -> Result<Transition, InvalidTransition> {
        let transition = match (self, event) {
            (SessionStatus::Waiting, SessionEvent::Start) => {
                Transition::Apply(SessionStatus::InProgress)
            }
            (SessionStatus::InProgress | SessionStatus::Finished, SessionEvent::Start) => {
                Transition::Replay
            }
            (SessionStatus::InProgress, SessionEvent::Advance) => {
                Transition::Apply(SessionStatus::InProgress)
            }
            (SessionStatus::InProgress, SessionEvent::Finish(_)) => {
                Transition::Apply(SessionStatus::Finished)
            }
            (SessionStatus::Finished, SessionEvent::Advance | SessionEvent::Finish(_)) => {
                Transition::Replay
            }
            (from @ SessionStatus::Waiting, event) => {
                return Err(InvalidTransition { from, event });
            }
        };

        Ok(transition)
    }
}
