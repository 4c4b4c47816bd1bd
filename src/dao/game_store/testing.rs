//! Store wrappers that force specific interleavings in tests.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
};

use futures::{FutureExt, future::BoxFuture};
use tokio::sync::Barrier;

use super::{Revision, SessionStore, VersionedSession, memory::MemorySessionStore};
use crate::dao::{
    models::{SessionEntity, SessionPatch},
    storage::{StorageError, StorageResult},
};

/// Holds the first `parties` reads until all of them have happened, so every
/// writer starts from the same revision.
#[derive(Clone)]
pub struct LockstepStore {
    inner: MemorySessionStore,
    barrier: Arc<Barrier>,
    parties: usize,
    reads: Arc<AtomicUsize>,
    conflicts: Arc<AtomicU32>,
}

impl LockstepStore {
    /// Empty store gating the first `parties` reads.
    pub fn new(parties: usize) -> Self {
        Self {
            inner: MemorySessionStore::default(),
            barrier: Arc::new(Barrier::new(parties)),
            parties,
            reads: Arc::new(AtomicUsize::new(0)),
            conflicts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Compare-and-swap writes that lost a race.
    pub fn conflicts(&self) -> u32 {
        self.conflicts.load(Ordering::SeqCst)
    }
}

impl SessionStore for LockstepStore {
    fn get(&self, pin: String) -> BoxFuture<'static, StorageResult<Option<VersionedSession>>> {
        let store = self.clone();
        async move {
            let found = store.inner.get(pin).await?;
            if store.reads.fetch_add(1, Ordering::SeqCst) < store.parties {
                store.barrier.wait().await;
            }
            Ok(found)
        }
        .boxed()
    }

    fn create(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Revision>> {
        self.inner.create(session)
    }

    fn replace(
        &self,
        expected: Revision,
        session: SessionEntity,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        async move {
            let result = store.inner.replace(expected, session).await;
            if matches!(result, Err(StorageError::RevisionConflict { .. })) {
                store.conflicts.fetch_add(1, Ordering::SeqCst);
            }
            result
        }
        .boxed()
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

type Edit = Arc<dyn Fn(&mut SessionEntity) + Send + Sync>;

/// Commits `edit` as another writer right before the first `replace` goes through.
#[derive(Clone)]
pub struct InterleavedWriteStore {
    inner: MemorySessionStore,
    edit: Edit,
    armed: Arc<AtomicBool>,
}

impl InterleavedWriteStore {
    /// Empty store, disarmed.
    pub fn new(edit: impl Fn(&mut SessionEntity) + Send + Sync + 'static) -> Self {
        Self {
            inner: MemorySessionStore::default(),
            edit: Arc::new(edit),
            armed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fire the edit on the next `replace`.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl SessionStore for InterleavedWriteStore {
    fn get(&self, pin: String) -> BoxFuture<'static, StorageResult<Option<VersionedSession>>> {
        self.inner.get(pin)
    }

    fn create(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Revision>> {
        self.inner.create(session)
    }

    fn replace(
        &self,
        expected: Revision,
        session: SessionEntity,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        async move {
            if store.armed.swap(false, Ordering::SeqCst) {
                let pin = session.pin.clone();
                let Some(current) = store.inner.get(pin.clone()).await? else {
                    return Err(StorageError::NotFound { pin });
                };
                let mut other = current.session;
                (store.edit)(&mut other);
                store.inner.replace(current.revision, other).await?;
            }
            store.inner.replace(expected, session).await
        }
        .boxed()
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
