// Use-case level inputs/outputs for the room actor.

use crate::domain::ai_actions::BuildAction;
use crate::domain::block::BlockType;
use crate::domain::errors::{AiError, JoinError};
use crate::domain::grid::Grid;
use crate::domain::room::{DesignDelta, GridDelta, HostAction, RoomSnapshot};
use tokio::sync::oneshot;

/// Why the room asks a connection to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Replaced,
    Kicked,
    RoomClosed,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::Replaced => "connection replaced",
            CloseReason::Kicked => "kicked by host",
            CloseReason::RoomClosed => "room closed",
        }
    }
}

/// Accepted join; `close_rx` fires when the room wants this connection gone.
#[derive(Debug)]
pub struct JoinAccepted {
    pub player_id: String,
    pub room_code: String,
    pub rejoined: bool,
    pub close_rx: oneshot::Receiver<CloseReason>,
}

#[derive(Debug, Clone)]
pub struct AssistantRequest {
    pub player_id: String,
    pub team_id: String,
    pub text: String,
    /// Client-provided target, used only when the team has no target of its own.
    pub target_hint: Option<Grid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantRejection {
    UnknownPlayer,
    NotTeamMember,
    NotBuilder,
    EmptyText,
    WrongPhase,
    Busy,
    RoomClosed,
}

impl AssistantRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            AssistantRejection::UnknownPlayer => "unknown player",
            AssistantRejection::NotTeamMember => "player is not on that team",
            AssistantRejection::NotBuilder => "only the builder can ask the assistant",
            AssistantRejection::EmptyText => "text is required",
            AssistantRejection::WrongPhase => "assistant is only available in round 2",
            AssistantRejection::Busy => "assistant is already working for this team",
            AssistantRejection::RoomClosed => "room closed",
        }
    }
}

#[derive(Debug)]
pub enum RoomCommand {
    Join {
        name: String,
        player_id: Option<String>,
        conn_token: u64,
        reply: oneshot::Sender<Result<JoinAccepted, JoinError>>,
    },
    Disconnect {
        player_id: String,
        conn_token: u64,
    },
    PlaceBlock {
        player_id: String,
        row: i64,
        col: i64,
        block: BlockType,
    },
    Chat {
        player_id: String,
        text: String,
    },
    SetTheme {
        player_id: String,
        theme: String,
    },
    SetTeamName {
        player_id: String,
        name: String,
    },
    HostAction {
        player_id: String,
        action: HostAction,
    },
    AssistantChat {
        request: AssistantRequest,
        reply: oneshot::Sender<Result<u64, AssistantRejection>>,
    },
    AssistantReply {
        team_id: String,
        request_id: u64,
        request_text: String,
        result: Result<String, AiError>,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct ChatLine {
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub is_ai: bool,
    pub team_id: String,
}

/// Everything the room publishes to its connections.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    State(RoomSnapshot),
    GridUpdate(GridDelta),
    DesignUpdate(DesignDelta),
    Chat(ChatLine),
    AiBuilding {
        team_id: String,
        actions: Vec<BuildAction>,
    },
    AiStatus {
        team_id: String,
        thinking: bool,
    },
    Closed,
}
