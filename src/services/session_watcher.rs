//! Poll-based change feed over one session document.
//!
//! Screens that keep a server connection open (a kiosk host display, a bot,
//! an integration test) use this instead of issuing their own GET loop. The
//! watcher only reads; timed expiry is still applied by the view endpoints.

use std::{sync::Arc, time::Duration};

use async_stream::try_stream;
use futures::Stream;
use tokio::time::{MissedTickBehavior, interval};
use tokio_stream::{StreamExt, wrappers::IntervalStream};
use tracing::debug;

use crate::{
    dao::{
        game_store::{Revision, SessionStore},
        storage::StorageError,
    },
    error::ServiceError,
    state::{game::GameSession, state_machine::SessionStatus},
};

/// Stream every new revision of the session stored under `pin`.
///
/// The first item is the current state. Later items are emitted only when the
/// revision moves. The stream ends after yielding a finished session and fails
/// with a not-found error if the document disappears.
pub fn watch_session(
    store: Arc<dyn SessionStore>,
    pin: String,
    every: Duration,
) -> impl Stream<Item = Result<GameSession, ServiceError>> + Send + 'static {
    try_stream! {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(ticker);
        let mut seen: Option<Revision> = None;

        while ticks.next().await.is_some() {
            let versioned = store
                .get(pin.clone())
                .await
                .map_err(ServiceError::from)?
                .ok_or_else(|| ServiceError::from(StorageError::NotFound { pin: pin.clone() }))?;

            if seen.as_ref() == Some(&versioned.revision) {
                continue;
            }
            debug!(pin = %pin, revision = %versioned.revision, "session changed");
            seen = Some(versioned.revision);

            let session = GameSession::from(versioned.session);
            let finished = session.status == SessionStatus::Finished;
            yield session;
            if finished {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use futures::StreamExt;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        dao::{
            game_store::{TxOutcome, memory::MemorySessionStore},
            models::SessionEntity,
        },
        state::{quiz::Question, state_machine::QuizMode},
    };

    const EVERY: Duration = Duration::from_millis(5);

    async fn seeded_store() -> Arc<dyn SessionStore> {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::default());
        let mut session = GameSession::create(
            "WXYZ".into(),
            "host".into(),
            vec![Question {
                text: "Sky colour?".into(),
                options: vec!["Blue".into(), "Green".into()],
                correct_answer: "Blue".into(),
            }],
            QuizMode::InstructorPaced,
            None,
            SystemTime::UNIX_EPOCH,
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();
        session.join("Alice", SystemTime::UNIX_EPOCH).unwrap();
        store.create(session.into()).await.unwrap();
        store
    }

    async fn mutate(store: &Arc<dyn SessionStore>, op: impl Fn(&mut GameSession)) {
        store
            .transactional_update("WXYZ", |entity: &mut SessionEntity| {
                let mut session = GameSession::from(entity.clone());
                op(&mut session);
                *entity = session.into();
                Ok::<_, StorageError>(TxOutcome::Write(()))
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn emits_each_revision_and_stops_after_finish() {
        let store = seeded_store().await;
        let mut stream = Box::pin(watch_session(store.clone(), "WXYZ".into(), EVERY));

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.status, SessionStatus::Waiting);

        mutate(&store, |session| {
            session.start(SystemTime::UNIX_EPOCH).unwrap();
        })
        .await;
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.status, SessionStatus::InProgress);

        mutate(&store, |session| {
            session.advance(None).unwrap();
        })
        .await;
        let third = stream.next().await.unwrap().unwrap();
        assert_eq!(third.status, SessionStatus::Finished);

        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn missing_session_fails_the_stream() {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::default());
        let mut stream = Box::pin(watch_session(store, "NOPE".into(), EVERY));

        assert!(matches!(
            stream.next().await,
            Some(Err(ServiceError::NotFound(_)))
        ));
        assert!(stream.next().await.is_none());
    }
}
