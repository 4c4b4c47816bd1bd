use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use axum_valid::Valid;

use crate::{
    dto::{
        session::{AdvanceQuery, CreateSessionRequest, PreviewQuizRequest, RevealRequest},
        views::{HostSessionView, QuizPreviewResponse},
    },
    error::AppError,
    services::session_service,
    state::SharedState,
};

const HOST_PASSWORD_HEADER: &str = "x-host-password";

/// Host-only endpoints for creating and driving games.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/host/quizzes/preview", post(preview_quiz))
        .route("/host/sessions", post(create_session))
        .route("/host/sessions/{pin}", get(get_session))
        .route("/host/sessions/{pin}/start", post(start_session))
        .route("/host/sessions/{pin}/advance", post(advance_session))
        .route("/host/sessions/{pin}/finish", post(finish_session))
        .route("/host/sessions/{pin}/reveal", put(set_answer_revealed))
        .route_layer(middleware::from_fn_with_state(state, require_host_password))
}

/// Parse a quiz file and report what would be played.
#[utoipa::path(
    post,
    path = "/host/quizzes/preview",
    tag = "host",
    params(("X-Host-Password" = String, Header, description = "Shared host password")),
    request_body = PreviewQuizRequest,
    responses(
        (status = 200, description = "Parsed quiz", body = QuizPreviewResponse),
        (status = 400, description = "Quiz cannot be played")
    )
)]
pub async fn preview_quiz(
    Valid(Json(payload)): Valid<Json<PreviewQuizRequest>>,
) -> Result<Json<QuizPreviewResponse>, AppError> {
    Ok(Json(session_service::preview_quiz(payload).await?))
}

/// Create a game in the waiting room under a fresh pin.
#[utoipa::path(
    post,
    path = "/host/sessions",
    tag = "host",
    params(("X-Host-Password" = String, Header, description = "Shared host password")),
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Game created", body = HostSessionView),
        (status = 400, description = "Invalid quiz or settings"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<HostSessionView>), AppError> {
    let view = session_service::create_session(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Host poll target.
#[utoipa::path(
    get,
    path = "/host/sessions/{pin}",
    tag = "host",
    params(
        ("X-Host-Password" = String, Header, description = "Shared host password"),
        ("pin" = String, Path, description = "Game pin")
    ),
    responses(
        (status = 200, description = "Current host view", body = HostSessionView),
        (status = 404, description = "Unknown pin")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
) -> Result<Json<HostSessionView>, AppError> {
    Ok(Json(session_service::get_host_view(&state, &pin).await?))
}

/// Reveal the first question.
#[utoipa::path(
    post,
    path = "/host/sessions/{pin}/start",
    tag = "host",
    params(
        ("X-Host-Password" = String, Header, description = "Shared host password"),
        ("pin" = String, Path, description = "Game pin")
    ),
    responses(
        (status = 200, description = "Game started", body = HostSessionView),
        (status = 409, description = "No players yet")
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
) -> Result<Json<HostSessionView>, AppError> {
    Ok(Json(session_service::start_session(&state, &pin).await?))
}

/// Move everyone to the next question, finishing after the last one.
#[utoipa::path(
    post,
    path = "/host/sessions/{pin}/advance",
    tag = "host",
    params(
        ("X-Host-Password" = String, Header, description = "Shared host password"),
        ("pin" = String, Path, description = "Game pin"),
        AdvanceQuery
    ),
    responses(
        (status = 200, description = "Game advanced", body = HostSessionView),
        (status = 409, description = "Not an instructor-paced game in progress")
    )
)]
pub async fn advance_session(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
    Query(query): Query<AdvanceQuery>,
) -> Result<Json<HostSessionView>, AppError> {
    Ok(Json(
        session_service::advance_session(&state, &pin, query.from_index).await?,
    ))
}

/// End the game now.
#[utoipa::path(
    post,
    path = "/host/sessions/{pin}/finish",
    tag = "host",
    params(
        ("X-Host-Password" = String, Header, description = "Shared host password"),
        ("pin" = String, Path, description = "Game pin")
    ),
    responses(
        (status = 200, description = "Game finished", body = HostSessionView),
        (status = 409, description = "Game never started")
    )
)]
pub async fn finish_session(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
) -> Result<Json<HostSessionView>, AppError> {
    Ok(Json(session_service::finish_session(&state, &pin).await?))
}

/// Show or hide the correct answer on player screens.
#[utoipa::path(
    put,
    path = "/host/sessions/{pin}/reveal",
    tag = "host",
    params(
        ("X-Host-Password" = String, Header, description = "Shared host password"),
        ("pin" = String, Path, description = "Game pin")
    ),
    request_body = RevealRequest,
    responses(
        (status = 200, description = "Reveal flag applied", body = HostSessionView),
        (status = 409, description = "Not an instructor-paced game in progress")
    )
)]
pub async fn set_answer_revealed(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
    Json(payload): Json<RevealRequest>,
) -> Result<Json<HostSessionView>, AppError> {
    Ok(Json(
        session_service::set_answer_revealed(
            &state,
            &pin,
            payload.question_index,
            payload.revealed,
        )
        .await?,
    ))
}

async fn require_host_password(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(HOST_PASSWORD_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            AppError::Unauthorized("missing host password header `X-Host-Password`".into())
        })?;

    if provided != state.config().host_password {
        return Err(AppError::Unauthorized("invalid host password".into()));
    }

    Ok(next.run(req).await)
}
