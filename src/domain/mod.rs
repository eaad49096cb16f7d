// Domain layer: building rules, grids, scoring and the room aggregate. No I/O.

pub mod ai_actions;
pub mod block;
pub mod coords;
pub mod errors;
pub mod grid;
pub mod notation;
pub mod phase;
pub mod ports;
pub mod room;
pub mod room_code;
pub mod roster;
pub mod scoring;
pub mod targets;

pub use block::BlockType;
pub use grid::{GRID_SIZE, Grid, GridError, MAX_HEIGHT};
pub use phase::{Phase, PhaseToggles};
pub use room::{HostAction, Room, RoomChange, RoomOptions, RoomSnapshot, StateError};
pub use room_code::RoomCode;
