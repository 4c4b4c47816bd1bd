use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{FutureExt, future::BoxFuture};

use crate::dao::{
    game_store::{Revision, SessionStore, VersionedSession},
    models::{SessionEntity, SessionPatch},
    storage::{StorageError, StorageResult},
};

/// Process-local store backed by a concurrent map; each entry carries a revision counter.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<DashMap<String, StoredSession>>,
}

struct StoredSession {
    revision: u64,
    session: SessionEntity,
}

impl StoredSession {
    fn revision(&self) -> Revision {
        Revision::new(self.revision.to_string())
    }
}

impl MemorySessionStore {
    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is stored.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn get_now(&self, pin: &str) -> Option<VersionedSession> {
        self.sessions.get(pin).map(|entry| VersionedSession {
            revision: entry.revision(),
            session: entry.session.clone(),
        })
    }

    fn create_now(&self, session: SessionEntity) -> StorageResult<Revision> {
        match self.sessions.entry(session.pin.clone()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists { pin: session.pin }),
            Entry::Vacant(slot) => {
                let stored = slot.insert(StoredSession {
                    revision: 1,
                    session,
                });
                Ok(stored.revision())
            }
        }
    }

    fn replace_now(&self, expected: &Revision, session: SessionEntity) -> StorageResult<Revision> {
        let Some(mut entry) = self.sessions.get_mut(&session.pin) else {
            return Err(StorageError::NotFound { pin: session.pin });
        };
        if entry.revision().as_str() != expected.as_str() {
            return Err(StorageError::RevisionConflict { pin: session.pin });
        }
        entry.revision += 1;
        entry.session = session;
        Ok(entry.revision())
    }

    fn set_now(&self, pin: String, patch: &SessionPatch) -> StorageResult<()> {
        let Some(mut entry) = self.sessions.get_mut(&pin) else {
            return Err(StorageError::NotFound { pin });
        };
        patch.apply(&mut entry.session);
        entry.revision += 1;
        Ok(())
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, pin: String) -> BoxFuture<'static, StorageResult<Option<VersionedSession>>> {
        let result = self.get_now(&pin);
        async move { Ok(result) }.boxed()
    }

    fn create(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Revision>> {
        let result = self.create_now(session);
        async move { result }.boxed()
    }

    fn replace(
        &self,
        expected: Revision,
        session: SessionEntity,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let result = self.replace_now(&expected, session);
        async move { result }.boxed()
    }

    fn set(&self, pin: String, patch: SessionPatch) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.set_now(pin, &patch);
        async move { result }.boxed()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        async { Ok(()) }.boxed()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        async { Ok(()) }.boxed()
    }
}
