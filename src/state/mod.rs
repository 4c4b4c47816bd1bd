pub mod clock;
pub mod game;
pub mod leaderboard;
pub mod quiz;
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{config::AppConfig, dao::game_store::SessionStore, error::ServiceError};

use self::clock::{Clock, SystemClock};

pub type SharedState = Arc<AppState>;

/// Central application state: the session store handle, runtime configuration and server clock.
///
/// Sessions themselves live in the store; nothing about a game is kept in memory here.
pub struct AppState {
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    degraded: watch::Sender<bool>,
    config: Arc<AppConfig>,
    clock: Arc<dyn Clock>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Same as [`AppState::new`] with an explicit clock.
    pub fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            session_store: RwLock::new(None),
            degraded: degraded_tx,
            config: Arc::new(config),
            clock,
        })
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Session store for request handlers; fails while degraded.
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        if self.is_degraded().await {
            return Err(ServiceError::Degraded);
        }
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn set_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Server clock used for every timing decision.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::game_store::memory::MemorySessionStore;

    #[tokio::test]
    async fn starts_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::new("secret"));
        assert!(state.is_degraded().await);
        assert!(matches!(
            state.require_session_store().await,
            Err(ServiceError::Degraded)
        ));

        state
            .set_session_store(Arc::new(MemorySessionStore::default()))
            .await;
        assert!(!state.is_degraded().await);
        assert!(state.require_session_store().await.is_ok());

        state.update_degraded(true).await;
        assert!(matches!(
            state.require_session_store().await,
            Err(ServiceError::Degraded)
        ));
    }
}
