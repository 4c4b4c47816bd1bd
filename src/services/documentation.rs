use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for Quiz Pin Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::host::preview_quiz,
        crate::routes::host::create_session,
        crate::routes::host::get_session,
        crate::routes::host::start_session,
        crate::routes::host::advance_session,
        crate::routes::host::finish_session,
        crate::routes::host::set_answer_revealed,
        crate::routes::player::join_prefill,
        crate::routes::player::join_session,
        crate::routes::player::get_player_view,
        crate::routes::player::submit_answer,
        crate::routes::player::leaderboard,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::common::QuizModeDto,
            crate::dto::common::SessionStatusDto,
            crate::dto::common::FinishReasonDto,
            crate::dto::common::PlayerPhaseDto,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::PreviewQuizRequest,
            crate::dto::session::RevealRequest,
            crate::dto::session::JoinRequest,
            crate::dto::session::SubmitAnswerRequest,
            crate::dto::views::HostSessionView,
            crate::dto::views::HostQuestionView,
            crate::dto::views::PlayerView,
            crate::dto::views::PlayerQuestionView,
            crate::dto::views::QuestionSummaryView,
            crate::dto::views::StandingView,
            crate::dto::views::RankView,
            crate::dto::views::AnswerResponse,
            crate::dto::views::LeaderboardResponse,
            crate::dto::views::JoinPrefillResponse,
            crate::dto::views::QuizPreviewResponse,
            crate::dto::views::QuizPreviewItem,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "host", description = "Game creation and control, guarded by the host password"),
        (name = "player", description = "Joining, answering and polling from player devices"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/host/sessions",
            "/host/sessions/{pin}/reveal",
            "/join",
            "/sessions/{pin}/players/{name}/answers",
            "/sessions/{pin}/leaderboard",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
