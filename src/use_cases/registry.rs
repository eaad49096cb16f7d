// Room registry: creates room actors on demand and forgets them when they exit.

use crate::domain::room::{Room, RoomOptions};
use crate::domain::room_code::RoomCode;
use crate::use_cases::room::{RoomDeps, room_task};
use crate::use_cases::types::{RoomCommand, RoomEvent};
use axum::extract::ws::Utf8Bytes;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast, mpsc, watch};
use tracing::{info, warn};

const MAX_CODE_ATTEMPTS: usize = 64;

/// Shared configuration for spawning room actors.
#[derive(Clone)]
pub struct RoomSettings {
    /// Capacity for inbound room commands.
    pub command_channel_capacity: usize,
    /// Capacity for broadcast room events (raw and serialized).
    pub event_broadcast_capacity: usize,
    /// Options applied when a room is created without overrides.
    pub default_options: RoomOptions,
    pub deps: RoomDeps,
    /// Runs for every new room before its actor starts; wires the event serializer.
    pub on_spawn: fn(&RoomHandle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Room already exists and cannot be re-created.
    AlreadyExists,
    /// No free code was found after repeated random draws.
    CodesExhausted,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyExists => f.write_str("room already exists"),
            RegistryError::CodesExhausted => f.write_str("no free room code"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Per-room channels.
#[derive(Clone)]
pub struct RoomHandle {
    /// Code clients use to target this room.
    pub code: RoomCode,
    /// Sender for commands into the room actor.
    pub commands: mpsc::Sender<RoomCommand>,
    /// Broadcast sender for raw room events.
    pub events_tx: broadcast::Sender<RoomEvent>,
    /// Broadcast sender for serialized room events.
    pub event_bytes_tx: broadcast::Sender<Utf8Bytes>,
    /// Watch sender holding the latest serialized full state.
    pub latest_state_tx: watch::Sender<Utf8Bytes>,
}

/// Thread-safe registry for active rooms.
pub struct RoomRegistry {
    settings: RoomSettings,
    rooms: RwLock<HashMap<RoomCode, RoomHandle>>,
}

impl RoomRegistry {
    pub fn new(settings: RoomSettings) -> Self {
        Self {
            settings,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_options(&self) -> RoomOptions {
        self.settings.default_options
    }

    /// Creates a room under a fresh random code.
    pub async fn create_room(
        self: &Arc<Self>,
        options: Option<RoomOptions>,
    ) -> Result<RoomHandle, RegistryError> {
        let mut rooms = self.rooms.write().await;
        let code = {
            let mut rng = rand::thread_rng();
            (0..MAX_CODE_ATTEMPTS)
                .map(|_| RoomCode::generate(&mut rng))
                .find(|code| !rooms.contains_key(code))
                .ok_or(RegistryError::CodesExhausted)?
        };
        let handle = self.spawn_room(code.clone(), options.unwrap_or(self.settings.default_options));
        rooms.insert(code, handle.clone());
        Ok(handle)
    }

    /// Creates a room under a caller-chosen code.
    pub async fn create_room_with_code(
        self: &Arc<Self>,
        code: RoomCode,
        options: Option<RoomOptions>,
    ) -> Result<RoomHandle, RegistryError> {
        let mut rooms = self.rooms.write().await;
        if rooms.get(&code).is_some_and(|h| !h.commands.is_closed()) {
            return Err(RegistryError::AlreadyExists);
        }
        let handle = self.spawn_room(code.clone(), options.unwrap_or(self.settings.default_options));
        rooms.insert(code, handle.clone());
        Ok(handle)
    }

    /// Returns the room for `code`, creating it on first use. The flag is true when created.
    pub async fn get_or_create(self: &Arc<Self>, code: RoomCode) -> (RoomHandle, bool) {
        if let Some(handle) = self.get_room(&code).await {
            return (handle, false);
        }
        let mut rooms = self.rooms.write().await;
        // Another join may have created it between the two locks.
        if let Some(handle) = rooms.get(&code).filter(|h| !h.commands.is_closed()) {
            return (handle.clone(), false);
        }
        let handle = self.spawn_room(code.clone(), self.settings.default_options);
        rooms.insert(code, handle.clone());
        (handle, true)
    }

    pub async fn get_room(&self, code: &RoomCode) -> Option<RoomHandle> {
        let rooms = self.rooms.read().await;
        rooms
            .get(code)
            .filter(|handle| !handle.commands.is_closed())
            .cloned()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Asks every room to close and waits until each accepted the request.
    pub async fn close_all(&self) {
        let handles: Vec<RoomHandle> = self.rooms.read().await.values().cloned().collect();
        let results = join_all(
            handles
                .iter()
                .map(|handle| handle.commands.send(RoomCommand::Shutdown)),
        )
        .await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(rooms = handles.len(), failed, "closed all rooms");
    }

    fn spawn_room(self: &Arc<Self>, code: RoomCode, options: RoomOptions) -> RoomHandle {
        let settings = &self.settings;
        let (commands, commands_rx) = mpsc::channel::<RoomCommand>(settings.command_channel_capacity);
        let (events_tx, _events_rx) =
            broadcast::channel::<RoomEvent>(settings.event_broadcast_capacity);
        let (event_bytes_tx, _event_bytes_rx) =
            broadcast::channel::<Utf8Bytes>(settings.event_broadcast_capacity);
        let (latest_state_tx, _latest_state_rx) = watch::channel::<Utf8Bytes>(Utf8Bytes::from(""));

        let handle = RoomHandle {
            code: code.clone(),
            commands,
            events_tx,
            event_bytes_tx,
            latest_state_tx,
        };
        (settings.on_spawn)(&handle);

        let room = Room::new(code.clone(), options, rand::random());
        let task = tokio::spawn(room_task(
            room,
            commands_rx,
            handle.commands.downgrade(),
            handle.events_tx.clone(),
            settings.deps.clone(),
        ));

        // Forget the room once its actor exits so the code can be reused.
        let registry = Arc::clone(self);
        let watched_code = code.clone();
        tokio::spawn(async move {
            if let Err(err) = task.await {
                warn!(room_code = %watched_code, error = %err, "room task failed");
            }
            registry.remove(&watched_code).await;
        });

        info!(room_code = %code, "room created");
        handle
    }

    async fn remove(&self, code: &RoomCode) {
        let mut rooms = self.rooms.write().await;
        // Only drop the entry if it still points at a dead actor.
        if rooms.get(code).is_some_and(|handle| handle.commands.is_closed()) {
            rooms.remove(code);
            info!(room_code = %code, "room removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::AiError;
    use crate::domain::ports::{ChatTurn, Clock, CompletionClient};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_epoch_millis(&self) -> u64 {
            self.0
        }
    }

    struct NoAssistant;

    #[async_trait]
    impl CompletionClient for NoAssistant {
        async fn complete(&self, _messages: Vec<ChatTurn>) -> Result<String, AiError> {
            Err(AiError::Disabled)
        }
    }

    fn registry() -> Arc<RoomRegistry> {
        Arc::new(RoomRegistry::new(RoomSettings {
            command_channel_capacity: 16,
            event_broadcast_capacity: 16,
            default_options: RoomOptions::default(),
            deps: RoomDeps {
                clock: Arc::new(FixedClock(1_700_000_000_000)),
                assistant: Arc::new(NoAssistant),
                assistant_timeout: Duration::from_secs(1),
                idle_timeout: Duration::from_secs(900),
            },
            on_spawn: |_| {},
        }))
    }

    #[tokio::test]
    async fn get_or_create_reuses_the_room() {
        let registry = registry();
        let code = RoomCode::parse("ROOM").expect("code");
        let (first, created) = registry.get_or_create(code.clone()).await;
        assert!(created);
        let (second, created_again) = registry.get_or_create(code.clone()).await;
        assert!(!created_again);
        assert!(first.commands.same_channel(&second.commands));
        assert_eq!(registry.room_count().await, 1);
    }

    #[tokio::test]
    async fn explicit_codes_cannot_be_taken_twice() {
        let registry = registry();
        let code = RoomCode::parse("WXYZ").expect("code");
        assert!(registry.create_room_with_code(code.clone(), None).await.is_ok());
        assert_eq!(
            registry
                .create_room_with_code(code, None)
                .await
                .err(),
            Some(RegistryError::AlreadyExists)
        );
    }

    #[tokio::test]
    async fn closed_rooms_are_removed() {
        let registry = registry();
        let handle = registry.create_room(None).await.expect("room");
        let code = handle.code.clone();
        registry.close_all().await;
        drop(handle);

        for _ in 0..50 {
            if registry.get_room(&code).await.is_none() && registry.room_count().await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("room {code} was not removed");
    }
}
