//! Data models shared across the session core, storage and API handlers.

pub mod identity;
pub mod session;
pub mod session_event;
pub mod session_payload;

pub use identity::{AccessScope, Identity, UserRole};
pub use session::{MentorRef, Session, SessionRow, SessionStatus, SessionWrite, StudentRef};
pub use session_event::ChangeEvent;
pub use session_payload::{SessionCard, SessionPayload, SessionResponse};
