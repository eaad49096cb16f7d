// Use cases layer: room actors, the room registry and assistant orchestration.

pub mod assistant;
pub mod registry;
pub mod room;
pub mod types;

pub use registry::{RegistryError, RoomHandle, RoomRegistry, RoomSettings};
pub use room::RoomDeps;
pub use types::{
    AssistantRejection, AssistantRequest, ChatLine, CloseReason, JoinAccepted, RoomCommand,
    RoomEvent,
};
