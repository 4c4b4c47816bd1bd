#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;
#[cfg(test)]
pub(crate) mod testing;

use std::{fmt, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{
    config::StorageBackend,
    dao::{
        models::{SessionEntity, SessionPatch},
        storage::{StorageError, StorageResult},
    },
};

/// Attempts made by [`transactional_update`](SessionStore) before reporting contention.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 8;
const INITIAL_BACKOFF: Duration = Duration::from_millis(5);
const MAX_BACKOFF: Duration = Duration::from_millis(200);

/// Opaque document version used for compare-and-swap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(String);

impl Revision {
    /// Wrap a backend-specific revision token.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Backend-specific token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A session document together with the revision it was read at.
#[derive(Debug, Clone)]
pub struct VersionedSession {
    /// Revision to hand back to [`SessionStore::replace`].
    pub revision: Revision,
    /// Document content.
    pub session: SessionEntity,
}

/// Persistence of session documents keyed by pin.
pub trait SessionStore: Send + Sync {
    /// Read a session and its revision.
    fn get(&self, pin: String) -> BoxFuture<'static, StorageResult<Option<VersionedSession>>>;
    /// Insert a new session; fails with [`StorageError::AlreadyExists`] when the pin is taken.
    fn create(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Revision>>;
    /// Overwrite a session only if it is still at `expected`.
    ///
    /// Fails with [`StorageError::RevisionConflict`] when another write got there first.
    fn replace(
        &self,
        expected: Revision,
        session: SessionEntity,
    ) -> BoxFuture<'static, StorageResult<Revision>>;
    /// Blind partial write; the last writer wins.
    fn set(&self, pin: String, patch: SessionPatch) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// What a transaction body decided.
#[derive(Debug)]
pub enum TxOutcome<T> {
    /// Persist the modified document, then return the value.
    Write(T),
    /// Nothing changed; return the value without writing.
    Unchanged(T),
}

impl dyn SessionStore {
    /// Optimistic read-validate-write loop on one session.
    ///
    /// `apply` runs against a fresh copy on every attempt and may reject the
    /// change (nothing is written) or report it as a no-op. Lost races are
    /// retried with jittered exponential backoff.
    pub async fn transactional_update<T, E, F>(&self, pin: &str, mut apply: F) -> Result<T, E>
    where
        F: FnMut(&mut SessionEntity) -> Result<TxOutcome<T>, E>,
        E: From<StorageError>,
    {
        let mut backoff = INITIAL_BACKOFF;

        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let Some(VersionedSession {
                revision,
                mut session,
            }) = self.get(pin.to_owned()).await?
            else {
                return Err(StorageError::NotFound {
                    pin: pin.to_owned(),
                }
                .into());
            };

            let value = match apply(&mut session)? {
                TxOutcome::Unchanged(value) => return Ok(value),
                TxOutcome::Write(value) => value,
            };

            match self.replace(revision, session).await {
                Ok(_) => return Ok(value),
                Err(StorageError::RevisionConflict { .. }) => {
                    debug!(pin, attempt, "revision conflict; retrying transaction");
                    let jitter = rand::rng().random_range(0..=backoff.as_millis() as u64);
                    sleep(backoff + Duration::from_millis(jitter)).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(
            pin,
            attempts = MAX_TRANSACTION_ATTEMPTS,
            "transaction abandoned under contention"
        );
        Err(StorageError::Contention {
            pin: pin.to_owned(),
            attempts: MAX_TRANSACTION_ATTEMPTS,
        }
        .into())
    }
}

/// Open the configured backend.
pub async fn connect(backend: &StorageBackend) -> StorageResult<Arc<dyn SessionStore>> {
    match backend {
        StorageBackend::Memory => Ok(Arc::new(memory::MemorySessionStore::default())),
        #[cfg(feature = "couch-store")]
        StorageBackend::Couch(config) => {
            let store = couchdb::CouchSessionStore::connect(config.clone()).await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "mongo-store")]
        StorageBackend::Mongo { uri, database } => {
            let config = mongodb::MongoConfig::from_uri(uri, database.as_deref()).await?;
            let store = mongodb::MongoSessionStore::connect(config).await?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU32, Ordering},
        },
        time::SystemTime,
    };

    use futures::FutureExt;

    use super::{memory::MemorySessionStore, *};
    use crate::state::state_machine::{QuizMode, SessionStatus};

    fn entity(pin: &str) -> SessionEntity {
        SessionEntity {
            pin: pin.into(),
            host_name: "host".into(),
            mode: QuizMode::InstructorPaced,
            time_per_question_secs: None,
            questions: vec![],
            status: SessionStatus::Waiting,
            current_question_index: -1,
            question_started_at: None,
            players: vec![],
            answer_revealed: false,
            finish_reason: None,
            created_at: SystemTime::UNIX_EPOCH,
            updated_at: SystemTime::UNIX_EPOCH,
        }
    }

    /// Store whose `replace` always loses the race.
    struct AlwaysConflicting {
        inner: MemorySessionStore,
        replaces: Arc<AtomicU32>,
    }

    impl SessionStore for AlwaysConflicting {
        fn get(&self, pin: String) -> BoxFuture<'static, StorageResult<Option<VersionedSession>>> {
            self.inner.get(pin)
        }
        fn create(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Revision>> {
            self.inner.create(session)
        }
        fn replace(
            &self,
            _expected: Revision,
            session: SessionEntity,
        ) -> BoxFuture<'static, StorageResult<Revision>> {
            self.replaces.fetch_add(1, Ordering::SeqCst);
            async move { Err(StorageError::RevisionConflict { pin: session.pin }) }.boxed()
        }
        fn set(&self, pin: String, patch: SessionPatch) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.set(pin, patch)
        }
        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }
        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    #[tokio::test]
    async fn writes_when_the_body_changes_the_document() {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::default());
        store.create(entity("AB12")).await.unwrap();
        let before = store.get("AB12".into()).await.unwrap().unwrap().revision;

        let value: Result<u8, StorageError> = store
            .transactional_update("AB12", |session| {
                session.host_name = "renamed".into();
                Ok(TxOutcome::Write(7))
            })
            .await;

        assert_eq!(value.unwrap(), 7);
        let after = store.get("AB12".into()).await.unwrap().unwrap();
        assert_eq!(after.session.host_name, "renamed");
        assert_ne!(after.revision, before);
    }

    #[tokio::test]
    async fn unchanged_and_rejected_bodies_write_nothing() {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::default());
        store.create(entity("AB12")).await.unwrap();
        let before = store.get("AB12".into()).await.unwrap().unwrap().revision;

        let unchanged: Result<(), StorageError> = store
            .transactional_update("AB12", |session| {
                session.host_name = "ignored".into();
                Ok(TxOutcome::Unchanged(()))
            })
            .await;
        assert!(unchanged.is_ok());

        let rejected: Result<(), StorageError> = store
            .transactional_update("AB12", |_| {
                Err(StorageError::AlreadyExists { pin: "AB12".into() })
            })
            .await;
        assert!(matches!(rejected, Err(StorageError::AlreadyExists { .. })));

        let after = store.get("AB12".into()).await.unwrap().unwrap();
        assert_eq!(after.revision, before);
        assert_eq!(after.session.host_name, "host");
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::default());
        let result: Result<(), StorageError> = store
            .transactional_update("NONE", |_| Ok(TxOutcome::Write(())))
            .await;
        assert!(matches!(result, Err(StorageError::NotFound { pin }) if pin == "NONE"));
    }

    #[tokio::test]
    async fn gives_up_after_bounded_conflicts() {
        let replaces = Arc::new(AtomicU32::new(0));
        let store: Arc<dyn SessionStore> = Arc::new(AlwaysConflicting {
            inner: MemorySessionStore::default(),
            replaces: replaces.clone(),
        });
        store.create(entity("AB12")).await.unwrap();

        let mut runs = 0;
        let result: Result<(), StorageError> = store
            .transactional_update("AB12", |_| {
                runs += 1;
                Ok(TxOutcome::Write(()))
            })
            .await;

        assert!(matches!(
            result,
            Err(StorageError::Contention { attempts, .. }) if attempts == MAX_TRANSACTION_ATTEMPTS
        ));
        assert_eq!(runs, MAX_TRANSACTION_ATTEMPTS);
        assert_eq!(replaces.load(Ordering::SeqCst), MAX_TRANSACTION_ATTEMPTS);
    }

    #[tokio::test]
    async fn concurrent_increments_are_never_lost() {
        let lockstep = testing::LockstepStore::new(4);
        let store: Arc<dyn SessionStore> = Arc::new(lockstep.clone());
        store.create(entity("AB12")).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .transactional_update::<_, StorageError, _>("AB12", |session| {
                        session.current_question_index += 1;
                        Ok(TxOutcome::Write(()))
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // All four read the same revision, so three of them had to retry.
        assert_eq!(lockstep.conflicts(), 3);
        let stored = store.get("AB12".into()).await.unwrap().unwrap();
        assert_eq!(stored.session.current_question_index, 3);
    }
}
