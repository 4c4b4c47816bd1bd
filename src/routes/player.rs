use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    dto::{
        session::{JoinQuery, JoinRequest, SubmitAnswerRequest},
        views::{AnswerResponse, JoinPrefillResponse, LeaderboardResponse, PlayerView},
    },
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Public endpoints used by player devices.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/join", get(join_prefill))
        .route("/sessions/{pin}/players", post(join_session))
        .route("/sessions/{pin}/players/{name}", get(get_player_view))
        .route("/sessions/{pin}/players/{name}/answers", post(submit_answer))
        .route("/sessions/{pin}/leaderboard", get(leaderboard))
}

/// Resolve a shared join link into join-form data.
#[utoipa::path(
    get,
    path = "/join",
    tag = "player",
    params(JoinQuery),
    responses((status = 200, description = "Join form data", body = JoinPrefillResponse))
)]
pub async fn join_prefill(
    State(state): State<SharedState>,
    Query(query): Query<JoinQuery>,
) -> Result<Json<JoinPrefillResponse>, AppError> {
    Ok(Json(
        session_service::join_prefill(&state, query.pin.as_deref()).await?,
    ))
}

/// Join a game under a display name.
#[utoipa::path(
    post,
    path = "/sessions/{pin}/players",
    tag = "player",
    params(("pin" = String, Path, description = "Game pin")),
    request_body = JoinRequest,
    responses(
        (status = 201, description = "Joined", body = PlayerView),
        (status = 404, description = "Unknown pin"),
        (status = 409, description = "Name taken or game finished")
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
    Json(payload): Json<JoinRequest>,
) -> Result<(StatusCode, Json<PlayerView>), AppError> {
    let view = session_service::join_session(&state, &pin, payload).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Player poll target.
#[utoipa::path(
    get,
    path = "/sessions/{pin}/players/{name}",
    tag = "player",
    params(
        ("pin" = String, Path, description = "Game pin"),
        ("name" = String, Path, description = "Player display name")
    ),
    responses(
        (status = 200, description = "Current player view", body = PlayerView),
        (status = 404, description = "Unknown pin or player")
    )
)]
pub async fn get_player_view(
    State(state): State<SharedState>,
    Path((pin, name)): Path<(String, String)>,
) -> Result<Json<PlayerView>, AppError> {
    Ok(Json(
        session_service::get_player_view(&state, &pin, &name).await?,
    ))
}

/// Answer one question.
#[utoipa::path(
    post,
    path = "/sessions/{pin}/players/{name}/answers",
    tag = "player",
    params(
        ("pin" = String, Path, description = "Game pin"),
        ("name" = String, Path, description = "Player display name")
    ),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer recorded", body = AnswerResponse),
        (status = 400, description = "Option not offered by the question"),
        (status = 409, description = "Already answered, wrong question or window closed")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path((pin, name)): Path<(String, String)>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    Ok(Json(
        session_service::submit_answer(&state, &pin, &name, payload).await?,
    ))
}

/// Ranked scores of a game.
#[utoipa::path(
    get,
    path = "/sessions/{pin}/leaderboard",
    tag = "player",
    params(("pin" = String, Path, description = "Game pin")),
    responses(
        (status = 200, description = "Leaderboard", body = LeaderboardResponse),
        (status = 404, description = "Unknown pin")
    )
)]
pub async fn leaderboard(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    Ok(Json(session_service::leaderboard(&state, &pin).await?))
}
