use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: &'static str,
    /// True while session commands are refused for lack of storage.
    pub degraded: bool,
}

impl HealthResponse {
    pub fn from_degraded(degraded: bool) -> Self {
        Self {
            status: if degraded { "degraded" } else { "ok" },
            degraded,
        }
    }
}
