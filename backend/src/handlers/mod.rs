pub mod admin;
pub mod sessions;

pub use sessions::*;
