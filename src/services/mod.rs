/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Session commands and poll views.
pub mod session_service;
/// Revision-driven change feed over a session.
pub mod session_watcher;
/// Storage connection supervisor driving degraded mode.
pub mod storage_supervisor;
