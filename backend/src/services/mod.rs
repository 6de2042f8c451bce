pub mod completion_sweeper;
pub mod live_sessions;
pub mod memory_backend;
pub mod reconciler;
pub mod session_backend;
pub mod session_status;

pub use live_sessions::{FeedStatus, LiveSessions, LiveSessionsConfig, LiveSessionsReader};
pub use memory_backend::MemorySessionBackend;
pub use session_backend::{BackendError, SessionBackend, SessionSubscription};
