use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::state_machine::{FinishReason, QuizMode, SessionStatus};

/// Pacing mode as exposed over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuizModeDto {
    /// The host moves everyone to the next question.
    InstructorPaced,
    /// Players move at their own pace under a per-question time limit.
    TimedPaced,
}

impl From<QuizModeDto> for QuizMode {
    fn from(value: QuizModeDto) -> Self {
        match value {
            QuizModeDto::InstructorPaced => QuizMode::InstructorPaced,
            QuizModeDto::TimedPaced => QuizMode::TimedPaced,
        }
    }
}

impl From<QuizMode> for QuizModeDto {
    fn from(value: QuizMode) -> Self {
        match value {
            QuizMode::InstructorPaced => QuizModeDto::InstructorPaced,
            QuizMode::TimedPaced => QuizModeDto::TimedPaced,
        }
    }
}

/// Session status as exposed over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatusDto {
    Waiting,
    InProgress,
    Finished,
}

impl From<SessionStatus> for SessionStatusDto {
    fn from(value: SessionStatus) -> Self {
        match value {
            SessionStatus::Waiting => SessionStatusDto::Waiting,
            SessionStatus::InProgress => SessionStatusDto::InProgress,
            SessionStatus::Finished => SessionStatusDto::Finished,
        }
    }
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FinishReasonDto {
    QuizCompleted,
    TimeExpired,
    ManualStop,
}

impl From<FinishReason> for FinishReasonDto {
    fn from(value: FinishReason) -> Self {
        match value {
            FinishReason::QuizCompleted => FinishReasonDto::QuizCompleted,
            FinishReason::TimeExpired => FinishReasonDto::TimeExpired,
            FinishReason::ManualStop => FinishReasonDto::ManualStop,
        }
    }
}

/// What a player's screen should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlayerPhaseDto {
    /// Lobby; the host has not started.
    WaitingForStart,
    /// A question awaits this player's answer.
    Answering,
    /// Answered; waiting for the host to advance.
    WaitingForNext,
    /// Every question answered or missed; waiting for the others.
    Done,
    /// Final standings.
    Finished,
}
