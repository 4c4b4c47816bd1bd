use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "quiz_sessions";

/// Runtime configuration describing how to reach the CouchDB database holding sessions.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    pub base_url: String,
    pub database: String,
    pub credentials: Option<(String, String)>,
}

impl CouchConfig {
    /// Read `COUCH_BASE_URL` (required), `COUCH_DB` and the optional basic-auth pair.
    pub fn from_env() -> CouchResult<Self> {
        let base_url =
            std::env::var("COUCH_BASE_URL").map_err(|_| CouchDaoError::MissingEnvVar {
                var: "COUCH_BASE_URL",
            })?;
        let database = std::env::var("COUCH_DB")
            .ok()
            .filter(|db| !db.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_owned());

        let credentials = std::env::var("COUCH_USERNAME")
            .ok()
            .zip(std::env::var("COUCH_PASSWORD").ok());

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            database,
            credentials,
        })
    }

    /// URL of the database itself.
    pub fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }
}
