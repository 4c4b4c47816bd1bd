use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with the degraded flag while logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.session_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        None => warn!("storage unavailable (degraded mode)"),
    }

    HealthResponse::from_degraded(state.is_degraded().await)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig, dao::game_store::memory::MemorySessionStore, state::AppState,
    };

    #[tokio::test]
    async fn reports_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::new("pw"));
        let response = health_status(&state).await;
        assert!(response.degraded);
        assert_eq!(response.status, "degraded");

        state
            .set_session_store(Arc::new(MemorySessionStore::default()))
            .await;
        let response = health_status(&state).await;
        assert!(!response.degraded);
        assert_eq!(response.status, "ok");
    }
}
