//! Session commands and views used by the host and player routes.
//!
//! Every command is a transaction on one session document: the document is
//! read, the rule is applied on the domain aggregate, and the result is
//! written back with a compare-and-swap. Views are computed at read time
//! against the server clock.

use std::time::SystemTime;

use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    dao::{
        game_store::{TxOutcome, VersionedSession},
        models::SessionEntity,
        storage::StorageError,
    },
    dto::{
        session::{
            CreateSessionRequest, JoinRequest, PreviewQuizRequest, SubmitAnswerRequest,
        },
        validation::{normalize_pin, normalize_player_name},
        views::{
            AnswerResponse, HostSessionView, JoinPrefillResponse, LeaderboardResponse,
            PlayerView, QuizPreviewResponse,
        },
    },
    error::ServiceError,
    state::{
        SharedState,
        game::{GameSession, Outcome, SessionError, generate_pin},
        quiz::{Question, load_quiz, validate_questions},
        state_machine::{FinishReason, QuizMode, SessionStatus},
    },
};

fn parse_pin(raw: &str) -> Result<String, ServiceError> {
    normalize_pin(raw).map_err(|err| ServiceError::InvalidInput(err.to_string()))
}

fn parse_quiz(text: &str) -> Result<Vec<Question>, ServiceError> {
    let questions = load_quiz(text)?;
    validate_questions(&questions)?;
    Ok(questions)
}

fn resolve_time_limit(
    state: &SharedState,
    mode: QuizMode,
    requested: Option<u32>,
) -> Result<Option<u32>, ServiceError> {
    if mode == QuizMode::InstructorPaced {
        return Ok(None);
    }

    let config = state.config();
    let seconds = requested.unwrap_or(config.default_time_per_question_secs);
    let range = config.time_limit_range();
    if !range.contains(&seconds) {
        return Err(ServiceError::InvalidInput(format!(
            "time per question must be between {} and {} seconds",
            range.start(),
            range.end()
        )));
    }
    Ok(Some(seconds))
}

fn merge(first: Outcome, second: Outcome) -> Outcome {
    (first == Outcome::Changed || second == Outcome::Changed).into()
}

/// Run `op` on the stored session inside an optimistic transaction.
///
/// `op` sees a fresh copy and the server time of each attempt. The session is
/// written only when it reports [`Outcome::Changed`].
async fn mutate_session<T, F>(
    state: &SharedState,
    pin: &str,
    mut op: F,
) -> Result<(GameSession, T), ServiceError>
where
    F: FnMut(&mut GameSession, SystemTime) -> Result<(Outcome, T), SessionError>,
{
    let store = state.require_session_store().await?;
    store
        .transactional_update(pin, |entity: &mut SessionEntity| {
            let now = state.clock().now();
            let mut session = GameSession::from(entity.clone());
            let (outcome, value) = op(&mut session, now)?;
            match outcome {
                Outcome::Unchanged => Ok(TxOutcome::Unchanged((session, value))),
                Outcome::Changed => {
                    session.updated_at = now;
                    *entity = SessionEntity::from(session.clone());
                    Ok(TxOutcome::Write((session, value)))
                }
            }
        })
        .await
}

/// Read a session, first applying any timed expiry that is due.
async fn load_session(state: &SharedState, pin: &str) -> Result<GameSession, ServiceError> {
    let store = state.require_session_store().await?;
    let Some(VersionedSession { session, .. }) = store.get(pin.to_owned()).await? else {
        return Err(StorageError::NotFound {
            pin: pin.to_owned(),
        }
        .into());
    };

    let session = GameSession::from(session);
    let grace = state.config().answer_grace;
    if !session.needs_expiry(state.clock().now(), grace) {
        return Ok(session);
    }

    let (session, outcome) = mutate_session(state, pin, |session, now| {
        let outcome = session.expire_if_timed_out(now, grace);
        Ok((outcome, outcome))
    })
    .await?;
    if outcome == Outcome::Changed && session.status == SessionStatus::Finished {
        info!(pin = %pin, reason = ?session.finish_reason, "timed game finished");
    }
    Ok(session)
}

fn host_view(state: &SharedState, session: &GameSession) -> HostSessionView {
    HostSessionView::new(session, state.config(), state.clock().now())
}

fn player_view_of(
    state: &SharedState,
    session: &GameSession,
    name: &str,
) -> Result<PlayerView, ServiceError> {
    PlayerView::new(session, name, state.config(), state.clock().now())
        .ok_or_else(|| SessionError::UnknownPlayer(name.to_owned()).into())
}

/// Parse an uploaded quiz without creating anything.
pub async fn preview_quiz(
    request: PreviewQuizRequest,
) -> Result<QuizPreviewResponse, ServiceError> {
    request.validate()?;
    let questions = parse_quiz(&request.quiz_text)?;
    Ok(QuizPreviewResponse::from(questions.as_slice()))
}

/// Create a waiting game under a fresh pin.
pub async fn create_session(
    state: &SharedState,
    request: CreateSessionRequest,
) -> Result<HostSessionView, ServiceError> {
    request.validate()?;
    let host_name = request.host_name.trim().to_owned();
    if host_name.is_empty() {
        return Err(ServiceError::InvalidInput("host name must not be empty".into()));
    }

    let questions = parse_quiz(&request.quiz_text)?;
    let mode = QuizMode::from(request.mode);
    let time_per_question_secs = resolve_time_limit(state, mode, request.time_per_question_secs)?;

    let store = state.require_session_store().await?;
    let attempts = state.config().max_pin_attempts;

    for attempt in 1..=attempts {
        let now = state.clock().now();
        let session = {
            let mut rng = rand::rng();
            GameSession::create(
                generate_pin(&mut rng),
                host_name.clone(),
                questions.clone(),
                mode,
                time_per_question_secs,
                now,
                &mut rng,
            )?
        };

        match store.create(SessionEntity::from(session.clone())).await {
            Ok(_) => {
                info!(
                    pin = %session.pin,
                    mode = ?mode,
                    questions = session.questions.len(),
                    "game created"
                );
                return Ok(host_view(state, &session));
            }
            Err(StorageError::AlreadyExists { pin }) => {
                debug!(pin = %pin, attempt, "pin already in use; drawing another");
            }
            Err(err) => return Err(err.into()),
        }
    }

    warn!(attempts, "could not allocate a free pin");
    Err(ServiceError::Conflict(
        "could not allocate a free pin; try again".into(),
    ))
}

/// Host poll target.
pub async fn get_host_view(
    state: &SharedState,
    pin: &str,
) -> Result<HostSessionView, ServiceError> {
    let pin = parse_pin(pin)?;
    let session = load_session(state, &pin).await?;
    Ok(host_view(state, &session))
}

/// Reveal the first question.
pub async fn start_session(
    state: &SharedState,
    pin: &str,
) -> Result<HostSessionView, ServiceError> {
    let pin = parse_pin(pin)?;
    let (session, outcome) = mutate_session(state, &pin, |session, now| {
        let outcome = session.start(now)?;
        Ok((outcome, outcome))
    })
    .await?;

    if outcome == Outcome::Changed {
        info!(pin = %pin, players = session.players.len(), "game started");
    }
    Ok(host_view(state, &session))
}

/// Move an instructor-paced game to the next question.
pub async fn advance_session(
    state: &SharedState,
    pin: &str,
    from_index: Option<i32>,
) -> Result<HostSessionView, ServiceError> {
    let pin = parse_pin(pin)?;
    let (session, outcome) = mutate_session(state, &pin, |session, _| {
        let outcome = session.advance(from_index)?;
        Ok((outcome, outcome))
    })
    .await?;

    if outcome == Outcome::Changed {
        info!(
            pin = %pin,
            index = session.current_question_index,
            status = ?session.status,
            "game advanced"
        );
    }
    Ok(host_view(state, &session))
}

/// End a game early.
pub async fn finish_session(
    state: &SharedState,
    pin: &str,
) -> Result<HostSessionView, ServiceError> {
    let pin = parse_pin(pin)?;
    let grace = state.config().answer_grace;
    let (session, outcome) = mutate_session(state, &pin, |session, now| {
        let expired = session.expire_if_timed_out(now, grace);
        let finished = session.finish(FinishReason::ManualStop)?;
        let outcome = merge(expired, finished);
        Ok((outcome, outcome))
    })
    .await?;

    if outcome == Outcome::Changed {
        info!(pin = %pin, reason = ?session.finish_reason, "game finished");
    }
    Ok(host_view(state, &session))
}

/// Show or hide the correct answer of the current question.
///
/// With `at_index` set, the toggle only applies while that question is still
/// current.
pub async fn set_answer_revealed(
    state: &SharedState,
    pin: &str,
    at_index: Option<i32>,
    revealed: bool,
) -> Result<HostSessionView, ServiceError> {
    let pin = parse_pin(pin)?;
    let (session, outcome) = mutate_session(state, &pin, |session, _| {
        let outcome = session.reveal(at_index, revealed)?;
        Ok((outcome, outcome))
    })
    .await?;

    if outcome == Outcome::Changed {
        debug!(
            pin = %pin,
            index = session.current_question_index,
            revealed,
            "answer reveal toggled"
        );
    }
    Ok(host_view(state, &session))
}

/// Register a player.
pub async fn join_session(
    state: &SharedState,
    pin: &str,
    request: JoinRequest,
) -> Result<PlayerView, ServiceError> {
    let pin = parse_pin(pin)?;
    let name = normalize_player_name(&request.name, state.config().max_player_name_len)
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

    let (session, ()) = mutate_session(state, &pin, |session, now| {
        session.join(&name, now)?;
        Ok((Outcome::Changed, ()))
    })
    .await?;

    info!(pin = %pin, player = %name, players = session.players.len(), "player joined");
    player_view_of(state, &session, &name)
}

/// Player poll target.
pub async fn get_player_view(
    state: &SharedState,
    pin: &str,
    name: &str,
) -> Result<PlayerView, ServiceError> {
    let pin = parse_pin(pin)?;
    let session = load_session(state, &pin).await?;
    player_view_of(state, &session, name.trim())
}

/// Record a player's answer.
pub async fn submit_answer(
    state: &SharedState,
    pin: &str,
    name: &str,
    request: SubmitAnswerRequest,
) -> Result<AnswerResponse, ServiceError> {
    let pin = parse_pin(pin)?;
    let name = name.trim();
    let grace = state.config().answer_grace;

    let (session, receipt) = mutate_session(state, &pin, |session, now| {
        // Windows that closed since the last poll are settled first.
        session.expire_if_timed_out(now, grace);
        let receipt =
            session.submit_answer(name, request.question_index, &request.option, now, grace)?;
        Ok((Outcome::Changed, receipt))
    })
    .await?;

    debug!(
        pin = %pin,
        player = %name,
        index = receipt.question_index,
        correct = ?receipt.correct,
        "answer recorded"
    );

    let score = session
        .players
        .get(name)
        .map(|record| record.score)
        .unwrap_or_default();
    Ok(AnswerResponse {
        question_index: receipt.question_index,
        correct: receipt.correct,
        score,
    })
}

/// Ranked leaderboard.
pub async fn leaderboard(
    state: &SharedState,
    pin: &str,
) -> Result<LeaderboardResponse, ServiceError> {
    let pin = parse_pin(pin)?;
    let session = load_session(state, &pin).await?;
    Ok(LeaderboardResponse::from(&session))
}

/// Pre-fill data for the join form reached through a shared link.
pub async fn join_prefill(
    state: &SharedState,
    raw_pin: Option<&str>,
) -> Result<JoinPrefillResponse, ServiceError> {
    let Some(pin) = raw_pin.and_then(|raw| normalize_pin(raw).ok()) else {
        return Ok(JoinPrefillResponse {
            pin: None,
            joinable: false,
            status: None,
        });
    };

    let store = state.require_session_store().await?;
    let status = store
        .get(pin.clone())
        .await?
        .map(|versioned| versioned.session.status);

    Ok(JoinPrefillResponse {
        joinable: status.is_some_and(|status| status != SessionStatus::Finished),
        status: status.map(Into::into),
        pin: Some(pin),
    })
}
