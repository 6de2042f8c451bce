pub mod id;

pub use id::{MentorId, SessionId, UserId};
