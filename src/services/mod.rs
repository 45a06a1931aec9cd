/// Game master operations: lifecycle, phase, scores, effects.
pub mod admin_service;
/// Avatar URL generation backed by the bounded cache.
pub mod avatar_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Team registration, reset and activity completion.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Device progression loading, reduction and persistence.
pub mod progress_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage reconnection, match restore and debounced snapshot writes.
pub mod storage_supervisor;
/// Countdown and effect expiry heartbeat.
pub mod ticker;
/// WebSocket connection and message handling service.
pub mod websocket_service;
