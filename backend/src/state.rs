use std::sync::Arc;

use crate::{
    config::Config,
    services::{live_sessions::LiveSessionsReader, session_backend::SessionBackend},
    utils::time::Clock,
};

#[derive(Clone)]
pub struct AppState {
    /// Write path for the admin CRUD handlers.
    pub backend: Arc<dyn SessionBackend>,
    /// Read side of the server's live session view.
    pub live: LiveSessionsReader,
    pub clock: Arc<dyn Clock>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        live: LiveSessionsReader,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self {
            backend,
            live,
            clock,
            config,
        }
    }
}
