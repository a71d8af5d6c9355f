//! Integration tests
//!
//! Components wired together over a real SQLite file, with the server
//! replaced by `MockRemote` or a wiremock server.

pub mod background_agent_test;
pub mod cache_test;
pub mod client_test;
pub mod http_remote_test;
pub mod offline_capture_test;
pub mod sync_queue_test;
pub mod timer_test;
