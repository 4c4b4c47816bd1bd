use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use tracing::debug;

use crate::dao::{
    game_store::{MAX_TRANSACTION_ATTEMPTS, Revision, SessionStore, VersionedSession},
    models::{SessionEntity, SessionPatch},
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{CouchSessionDocument, WriteResponse, session_doc_id},
};

#[derive(Clone)]
pub struct CouchSessionStore {
    client: Client,
    config: Arc<CouchConfig>,
}

enum WriteOutcome {
    Written(Revision),
    Conflict,
}

impl CouchSessionStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let store = Self {
            client,
            config: Arc::new(config),
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.credentials {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.config.database_url(), path);
        self.authorize(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.config.database.clone();
        let url = self.config.database_url();

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                let status = create.status();
                // 412 means another instance created it first.
                if status.is_success() || status == StatusCode::PRECONDITION_FAILED {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus { database, status })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn fetch(&self, pin: &str) -> CouchResult<Option<CouchSessionDocument>> {
        let doc_id = session_doc_id(pin);
        let response = self
            .request(Method::GET, &doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<CouchSessionDocument>()
                .await
                .map(Some)
                .map_err(|source| CouchDaoError::DecodeResponse {
                    path: doc_id,
                    source,
                }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id,
                status: other,
            }),
        }
    }

    async fn write(&self, document: &CouchSessionDocument) -> CouchResult<WriteOutcome> {
        let response = self
            .request(Method::PUT, &document.id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: document.id.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Ok(WriteOutcome::Conflict),
            status if status.is_success() => {
                let body = response.json::<WriteResponse>().await.map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: document.id.clone(),
                        source,
                    }
                })?;
                Ok(WriteOutcome::Written(Revision::new(body.rev)))
            }
            other => Err(CouchDaoError::RequestStatus {
                path: document.id.clone(),
                status: other,
            }),
        }
    }

    async fn patch(&self, pin: String, patch: SessionPatch) -> StorageResult<()> {
        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let Some(mut document) = self.fetch(&pin).await? else {
                return Err(StorageError::NotFound { pin });
            };
            patch.apply(&mut document.session);
            match self.write(&document).await? {
                WriteOutcome::Written(_) => return Ok(()),
                WriteOutcome::Conflict => {
                    debug!(pin = %pin, attempt, "CouchDB patch conflicted; retrying");
                }
            }
        }
        Err(StorageError::Contention {
            pin,
            attempts: MAX_TRANSACTION_ATTEMPTS,
        })
    }
}

impl SessionStore for CouchSessionStore {
    fn get(&self, pin: String) -> BoxFuture<'static, StorageResult<Option<VersionedSession>>> {
        let store = self.clone();
        Box::pin(async move {
            let Some(document) = store.fetch(&pin).await? else {
                return Ok(None);
            };
            let rev = document
                .rev
                .ok_or_else(|| CouchDaoError::MissingRevision { path: document.id })?;
            Ok(Some(VersionedSession {
                revision: Revision::new(rev),
                session: document.session,
            }))
        })
    }

    fn create(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move {
            let pin = session.pin.clone();
            let document = CouchSessionDocument::new(session, None);
            match store.write(&document).await? {
                WriteOutcome::Written(revision) => Ok(revision),
                WriteOutcome::Conflict => Err(StorageError::AlreadyExists { pin }),
            }
        })
    }

    fn replace(
        &self,
        expected: Revision,
        session: SessionEntity,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move {
            let pin = session.pin.clone();
            let document = CouchSessionDocument::new(session, Some(expected.as_str().to_owned()));
            match store.write(&document).await? {
                WriteOutcome::Written(revision) => Ok(revision),
                WriteOutcome::Conflict => Err(StorageError::RevisionConflict { pin }),
            }
        })
    }

    fn set(&self, pin: String, patch: SessionPatch) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.patch(pin, patch).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.config.database_url();
            let response = store
                .authorize(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
