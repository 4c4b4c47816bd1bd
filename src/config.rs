//! Application-level configuration loading: host password, polling cadence, game limits and
//! the storage backend selection.

use std::{env, fs, io::ErrorKind, ops::RangeInclusive, path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

#[cfg(feature = "couch-store")]
use crate::dao::game_store::couchdb::{CouchConfig, CouchDaoError};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_PIN_BACK_CONFIG_PATH";
/// Environment variable holding the shared host password.
const HOST_PASSWORD_ENV: &str = "HOST_PASSWORD";
/// Environment variable selecting the storage backend.
const STORAGE_BACKEND_ENV: &str = "STORAGE_BACKEND";

const DEFAULT_JOIN_BASE_URL: &str = "http://localhost:8080/join";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_500;
const POLL_INTERVAL_BOUNDS_MS: RangeInclusive<u64> = 1_000..=2_000;
const DEFAULT_ANSWER_GRACE_MS: u64 = 1_000;
const DEFAULT_MIN_TIME_PER_QUESTION_SECS: u32 = 10;
const DEFAULT_MAX_TIME_PER_QUESTION_SECS: u32 = 300;
const DEFAULT_TIME_PER_QUESTION_SECS: u32 = 60;
const DEFAULT_MAX_PIN_ATTEMPTS: u32 = 16;
const DEFAULT_MAX_PLAYER_NAME_LEN: usize = 32;

/// Fatal configuration problems detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No host password in the environment nor in the config file.
    #[error("host password is not configured; set `{var}` or `host_password` in the config file")]
    MissingHostPassword { var: &'static str },
    /// A variable required by the selected backend is missing.
    #[error("missing environment variable `{var}` required by the {backend} storage backend")]
    MissingEnvVar {
        backend: &'static str,
        var: &'static str,
    },
    /// `STORAGE_BACKEND` holds an unknown value.
    #[error("unknown storage backend `{0}` (expected memory, couch or mongo)")]
    UnknownBackend(String),
    /// The backend exists but was not compiled in.
    #[error("storage backend `{0}` is disabled in this build")]
    BackendDisabled(&'static str),
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Shared secret the host sends with every host command.
    pub host_password: String,
    /// Base of the shareable join link; the pin is appended as `?pin=`.
    pub join_base_url: String,
    /// Poll cadence advertised to clients.
    pub poll_interval: Duration,
    /// Tolerance added after each answer deadline.
    pub answer_grace: Duration,
    /// Shortest time per question a host may choose.
    pub min_time_per_question_secs: u32,
    /// Longest time per question a host may choose.
    pub max_time_per_question_secs: u32,
    /// Time per question used when a timed game is created without one.
    pub default_time_per_question_secs: u32,
    /// Pin draws before creation gives up.
    pub max_pin_attempts: u32,
    /// Longest accepted player name, in characters.
    pub max_player_name_len: usize,
}

impl AppConfig {
    /// Built-in defaults with the given host password.
    pub fn new(host_password: impl Into<String>) -> Self {
        Self {
            host_password: host_password.into(),
            join_base_url: DEFAULT_JOIN_BASE_URL.to_owned(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            answer_grace: Duration::from_millis(DEFAULT_ANSWER_GRACE_MS),
            min_time_per_question_secs: DEFAULT_MIN_TIME_PER_QUESTION_SECS,
            max_time_per_question_secs: DEFAULT_MAX_TIME_PER_QUESTION_SECS,
            default_time_per_question_secs: DEFAULT_TIME_PER_QUESTION_SECS,
            max_pin_attempts: DEFAULT_MAX_PIN_ATTEMPTS,
            max_player_name_len: DEFAULT_MAX_PLAYER_NAME_LEN,
        }
    }

    /// Load the configuration from disk and the environment, falling back to built-in defaults.
    ///
    /// Only the host password is mandatory.
    pub fn load() -> Result<Self, ConfigError> {
        let raw = read_raw_config();
        Self::from_raw(raw, env::var(HOST_PASSWORD_ENV).ok())
    }

    fn from_raw(raw: RawConfig, password_override: Option<String>) -> Result<Self, ConfigError> {
        let host_password = password_override
            .or(raw.host_password)
            .filter(|password| !password.is_empty())
            .ok_or(ConfigError::MissingHostPassword {
                var: HOST_PASSWORD_ENV,
            })?;

        let mut config = Self::new(host_password);
        if let Some(url) = raw.join_base_url.filter(|url| !url.trim().is_empty()) {
            config.join_base_url = url.trim().to_owned();
        }
        if let Some(ms) = raw.poll_interval_ms {
            let clamped =
                ms.clamp(*POLL_INTERVAL_BOUNDS_MS.start(), *POLL_INTERVAL_BOUNDS_MS.end());
            if clamped != ms {
                warn!(requested = ms, used = clamped, "poll interval out of range; clamped");
            }
            config.poll_interval = Duration::from_millis(clamped);
        }
        if let Some(ms) = raw.answer_grace_ms {
            config.answer_grace = Duration::from_millis(ms);
        }
        if let Some(min) = raw.min_time_per_question_secs {
            config.min_time_per_question_secs = min.max(1);
        }
        if let Some(max) = raw.max_time_per_question_secs {
            config.max_time_per_question_secs = max;
        }
        config.max_time_per_question_secs = config
            .max_time_per_question_secs
            .max(config.min_time_per_question_secs);
        config.default_time_per_question_secs = raw
            .default_time_per_question_secs
            .unwrap_or(config.default_time_per_question_secs)
            .clamp(
                config.min_time_per_question_secs,
                config.max_time_per_question_secs,
            );
        if let Some(attempts) = raw.max_pin_attempts {
            config.max_pin_attempts = attempts.max(1);
        }
        if let Some(len) = raw.max_player_name_len {
            config.max_player_name_len = len.max(1);
        }

        Ok(config)
    }

    /// Accepted time per question, in seconds.
    pub fn time_limit_range(&self) -> RangeInclusive<u32> {
        self.min_time_per_question_secs..=self.max_time_per_question_secs
    }

    /// Shareable link that pre-fills the join form.
    pub fn join_url(&self, pin: &str) -> String {
        let separator = if self.join_base_url.contains('?') {
            '&'
        } else {
            '?'
        };
        format!("{}{separator}pin={pin}", self.join_base_url)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    host_password: Option<String>,
    join_base_url: Option<String>,
    poll_interval_ms: Option<u64>,
    answer_grace_ms: Option<u64>,
    min_time_per_question_secs: Option<u32>,
    max_time_per_question_secs: Option<u32>,
    default_time_per_question_secs: Option<u32>,
    max_pin_attempts: Option<u32>,
    max_player_name_len: Option<usize>,
}

fn read_raw_config() -> RawConfig {
    let path = resolve_config_path();
    match fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
            Ok(raw) => {
                info!(path = %path.display(), "loaded configuration file");
                raw
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to parse config; falling back to defaults"
                );
                RawConfig::default()
            }
        },
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!(
                path = %path.display(),
                "config file not found; using built-in defaults"
            );
            RawConfig::default()
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "failed to read config; falling back to defaults"
            );
            RawConfig::default()
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Storage backend selected through `STORAGE_BACKEND`.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// Process-local store; sessions are lost on restart.
    Memory,
    /// CouchDB over HTTP.
    #[cfg(feature = "couch-store")]
    Couch(CouchConfig),
    /// MongoDB.
    #[cfg(feature = "mongo-store")]
    Mongo {
        /// Connection string.
        uri: String,
        /// Database name.
        database: Option<String>,
    },
}

impl StorageBackend {
    /// Read the backend selection and its credentials from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let kind = env::var(STORAGE_BACKEND_ENV).unwrap_or_else(|_| "memory".into());
        match kind.trim().to_ascii_lowercase().as_str() {
            "" | "memory" => Ok(StorageBackend::Memory),
            "couch" | "couchdb" => Self::couch_from_env(),
            "mongo" | "mongodb" => Self::mongo_from_env(),
            other => Err(ConfigError::UnknownBackend(other.to_owned())),
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            #[cfg(feature = "couch-store")]
            StorageBackend::Couch(_) => "couch",
            #[cfg(feature = "mongo-store")]
            StorageBackend::Mongo { .. } => "mongo",
        }
    }

    #[cfg(feature = "couch-store")]
    fn couch_from_env() -> Result<Self, ConfigError> {
        CouchConfig::from_env()
            .map(StorageBackend::Couch)
            .map_err(|err| match err {
                CouchDaoError::MissingEnvVar { var } => ConfigError::MissingEnvVar {
                    backend: "couch",
                    var,
                },
                _ => ConfigError::BackendDisabled("couch"),
            })
    }

    #[cfg(not(feature = "couch-store"))]
    fn couch_from_env() -> Result<Self, ConfigError> {
        Err(ConfigError::BackendDisabled("couch"))
    }

    #[cfg(feature = "mongo-store")]
    fn mongo_from_env() -> Result<Self, ConfigError> {
        let uri = env::var("MONGO_URI").map_err(|_| ConfigError::MissingEnvVar {
            backend: "mongo",
            var: "MONGO_URI",
        })?;
        let database = env::var("MONGO_DB").ok().filter(|db| !db.is_empty());
        Ok(StorageBackend::Mongo { uri, database })
    }

    #[cfg(not(feature = "mongo-store"))]
    fn mongo_from_env() -> Result<Self, ConfigError> {
        Err(ConfigError::BackendDisabled("mongo"))
    }
}
