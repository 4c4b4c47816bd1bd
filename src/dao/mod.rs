/// Session storage backends and the optimistic update loop.
pub mod game_store;
/// Persistence model of a session document.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
