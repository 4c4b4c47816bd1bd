use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{
    Client, Collection, Database,
    bson::{Document, doc, serialize_to_bson},
    error::{ErrorKind, WriteFailure},
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoSessionDocument, pin_filter, revision_filter},
};
use crate::dao::{
    game_store::{Revision, SessionStore, VersionedSession},
    models::{SessionEntity, SessionPatch},
    storage::{StorageError, StorageResult},
};

const SESSION_COLLECTION_NAME: &str = "sessions";
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = establish_connection(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}

fn parse_revision(pin: &str, revision: &Revision) -> StorageResult<i64> {
    revision
        .as_str()
        .parse()
        .map_err(|_| StorageError::RevisionConflict {
            pin: pin.to_owned(),
        })
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB.
    ///
    /// Sessions are keyed by `_id`, so no secondary index is needed.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = establish_connection(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        Ok(Self { inner })
    }

    async fn collection(&self) -> Collection<MongoSessionDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoSessionDocument>(SESSION_COLLECTION_NAME)
    }

    async fn find(&self, pin: &str) -> MongoResult<Option<MongoSessionDocument>> {
        self.collection()
            .await
            .find_one(pin_filter(pin))
            .await
            .map_err(|source| MongoDaoError::LoadSession {
                pin: pin.to_owned(),
                source,
            })
    }

    async fn insert(&self, session: SessionEntity) -> StorageResult<Revision> {
        let pin = session.pin.clone();
        let document = MongoSessionDocument::new(session, 1);
        match self.collection().await.insert_one(&document).await {
            Ok(_) => Ok(Revision::new(document.revision.to_string())),
            Err(err) if is_duplicate_key(&err) => Err(StorageError::AlreadyExists { pin }),
            Err(source) => Err(MongoDaoError::SaveSession { pin, source }.into()),
        }
    }

    async fn compare_and_swap(
        &self,
        expected: Revision,
        session: SessionEntity,
    ) -> StorageResult<Revision> {
        let pin = session.pin.clone();
        let current = parse_revision(&pin, &expected)?;
        let document = MongoSessionDocument::new(session, current + 1);

        let result = self
            .collection()
            .await
            .replace_one(revision_filter(&pin, current), &document)
            .await
            .map_err(|source| MongoDaoError::SaveSession {
                pin: pin.clone(),
                source,
            })?;

        if result.matched_count == 0 {
            // Either a newer revision exists or the session is gone; the caller re-reads.
            return Err(StorageError::RevisionConflict { pin });
        }
        Ok(Revision::new(document.revision.to_string()))
    }

    async fn patch(&self, pin: String, patch: SessionPatch) -> StorageResult<()> {
        let updated_at =
            serialize_to_bson(&patch.updated_at).map_err(|err| MongoDaoError::EncodePatch {
                pin: pin.clone(),
                message: err.to_string(),
            })?;

        let mut fields = Document::new();
        if let Some(revealed) = patch.answer_revealed {
            fields.insert("answer_revealed", revealed);
        }
        fields.insert("updated_at", updated_at);

        let result = self
            .collection()
            .await
            .update_one(
                pin_filter(&pin),
                doc! { "$set": fields, "$inc": { "revision": 1_i64 } },
            )
            .await
            .map_err(|source| MongoDaoError::SaveSession {
                pin: pin.clone(),
                source,
            })?;

        if result.matched_count == 0 {
            return Err(StorageError::NotFound { pin });
        }
        Ok(())
    }
}

impl SessionStore for MongoSessionStore {
    fn get(&self, pin: String) -> BoxFuture<'static, StorageResult<Option<VersionedSession>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store.find(&pin).await?;
            Ok(document.map(|document| VersionedSession {
                revision: Revision::new(document.revision.to_string()),
                session: document.session,
            }))
        })
    }

    fn create(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move { store.insert(session).await })
    }

    fn replace(
        &self,
        expected: Revision,
        session: SessionEntity,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move { store.compare_and_swap(expected, session).await })
    }

    fn set(&self, pin: String, patch: SessionPatch) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.patch(pin, patch).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_tokens_must_be_integers() {
        assert_eq!(parse_revision("AB12", &Revision::new("41")).unwrap(), 41);
        assert!(matches!(
            parse_revision("AB12", &Revision::new("3-abc")),
            Err(StorageError::RevisionConflict { .. })
        ));
    }
}
