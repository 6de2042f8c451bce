//! Persistence backed by PostgreSQL.

pub mod session;

pub use session::PgSessionBackend;
