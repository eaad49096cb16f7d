// Network adapter modules split by player sockets vs HTTP routes.

pub mod api;
pub mod client;

pub use api::{ai_chat_handler, create_room_handler, get_room_handler};
pub use client::{spawn_room_serializer, ws_handler};
