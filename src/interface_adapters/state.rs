use crate::domain::ports::Clock;
use crate::use_cases::RoomRegistry;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct AppState {
    // Every live room, keyed by its code.
    pub registry: Arc<RoomRegistry>,
}

/// Wall clock used for timer deadlines published to clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}
