use std::time::Instant;

use session_dispatch::SessionHandle;

#[derive(Clone)]
pub struct AppState {
    start: Instant,
    session: SessionHandle,
}

impl AppState {
    pub fn new(session: SessionHandle) -> Self {
        Self {
            start: Instant::now(),
            session,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }
}
