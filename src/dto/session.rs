use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::dto::common::QuizModeDto;

/// Payload used to create a new game from an uploaded quiz file.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, max = 64))]
    pub host_name: String,
    /// Quiz in the `Q:` / `O:` / `A:` text format.
    #[validate(length(min = 1))]
    pub quiz_text: String,
    pub mode: QuizModeDto,
    /// Only used by timed games; defaults to the configured value.
    #[serde(default)]
    pub time_per_question_secs: Option<u32>,
}

/// Quiz text to check before creating a game.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PreviewQuizRequest {
    #[validate(length(min = 1))]
    pub quiz_text: String,
}

/// Host request to show or hide the correct answer of the current question.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RevealRequest {
    pub revealed: bool,
    /// Question the host is looking at. Ignored once the game has moved on.
    #[serde(default)]
    pub question_index: Option<i32>,
}

/// Player registration.
#[derive(Debug, Deserialize, ToSchema)]
pub struct JoinRequest {
    pub name: String,
}

/// Player answer to one question.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitAnswerRequest {
    pub question_index: i32,
    /// Text of the chosen option.
    pub option: String,
}

/// Guard making `advance` safe to replay.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AdvanceQuery {
    /// Question the host was looking at when pressing "next".
    pub from_index: Option<i32>,
}

/// Pin carried by a shared join link.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct JoinQuery {
    pub pin: Option<String>,
}
