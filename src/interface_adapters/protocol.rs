// Wire protocol DTOs and conversions for public room messages.
// HTTP request/response bodies for the REST routes live here too.

use crate::domain::ai_actions::BuildAction;
use crate::domain::block::BlockType;
use crate::domain::grid::{Grid, GridError};
use crate::domain::phase::PhaseToggles;
use crate::domain::room::{
    DesignDelta, GridDelta, HostAction, PlayerSnapshot, RoomOptions, RoomSnapshot, TeamSnapshot,
};
use crate::domain::roster::{Role, TeamBounds};
use crate::domain::scoring::{CellScore, ScoreResult};
use crate::use_cases::{ChatLine, RoomEvent};
use serde::{Deserialize, Serialize};

/// Messages the server sends to connected clients over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    // Identity assigned after the join handshake.
    Welcome(WelcomeDto),
    State(RoomStateDto),
    GridUpdate(GridUpdateDto),
    DesignUpdate(DesignUpdateDto),
    Chat(ChatDto),
    AiBuilding(AiBuildingDto),
    AiStatus(AiStatusDto),
    // Sent right after `welcome` when an existing seat was rebound.
    Reconnected {},
    RoomClosed {},
}

/// Messages the client sends to the server over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    // Must be the first message on every connection.
    Join(JoinPayload),
    PlaceBlock(PlaceBlockPayload),
    Chat(ChatPayload),
    SetTheme(SetThemePayload),
    SetTeamName(SetTeamNamePayload),
    HostAction(HostActionPayload),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    #[serde(default)]
    pub name: String,
    /// Previously issued id, to reclaim a seat after a reconnect.
    #[serde(default)]
    pub player_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceBlockPayload {
    pub row: i64,
    pub col: i64,
    // Kept as text so an unknown block is a soft rejection, not a parse failure.
    pub block: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatPayload {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetThemePayload {
    pub theme: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetTeamNamePayload {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HostActionKind {
    StartRound,
    SkipToReveal,
    Pause,
    NextReveal,
    KickPlayer,
    EndGame,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostActionPayload {
    pub action: HostActionKind,
    #[serde(default)]
    pub target_player_id: Option<String>,
}

impl HostActionPayload {
    /// `None` when `kickPlayer` arrives without a target.
    pub fn into_action(self) -> Option<HostAction> {
        Some(match self.action {
            HostActionKind::StartRound => HostAction::StartRound,
            HostActionKind::SkipToReveal => HostAction::SkipToReveal,
            HostActionKind::Pause => HostAction::Pause,
            HostActionKind::NextReveal => HostAction::NextReveal,
            HostActionKind::EndGame => HostAction::EndGame,
            HostActionKind::KickPlayer => HostAction::KickPlayer {
                target_player_id: self.target_player_id?,
            },
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeDto {
    pub player_id: String,
    pub room_code: String,
}

/// Stacks by row then column, each stack bottom-up.
pub type GridDto = Vec<Vec<Vec<BlockType>>>;

pub fn grid_to_dto(grid: &Grid) -> GridDto {
    (0..grid.size())
        .map(|row| {
            (0..grid.size())
                .map(|col| grid.stack(row, col).to_vec())
                .collect()
        })
        .collect()
}

/// Rebuilds a grid from client data, rejecting anything a player could not have built.
pub fn grid_from_dto(dto: &GridDto) -> Result<Grid, GridError> {
    let mut grid = Grid::default();
    for (row, cols) in dto.iter().enumerate() {
        for (col, stack) in cols.iter().enumerate() {
            if stack.is_empty() {
                continue;
            }
            grid.set_stack(row, col, stack)?;
        }
    }
    Ok(grid)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellScoreDto {
    pub row: usize,
    pub col: usize,
    pub height: usize,
    pub expected: BlockType,
    pub actual: BlockType,
    pub correct: bool,
}

impl From<&CellScore> for CellScoreDto {
    fn from(cell: &CellScore) -> Self {
        Self {
            row: cell.row,
            col: cell.col,
            height: cell.height,
            expected: cell.expected,
            actual: cell.actual,
            correct: cell.correct,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDto {
    pub percentage: u32,
    pub correct: u32,
    pub total: u32,
    pub cells: Vec<CellScoreDto>,
}

impl From<&ScoreResult> for ScoreDto {
    fn from(score: &ScoreResult) -> Self {
        Self {
            percentage: score.percentage,
            correct: score.correct,
            total: score.total,
            cells: score.cells.iter().map(CellScoreDto::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamDto {
    pub id: String,
    pub name: String,
    pub player_ids: Vec<String>,
    pub grid: GridDto,
    pub round_target: Option<GridDto>,
    pub target_name: Option<String>,
    pub round1_grid: Option<GridDto>,
    pub round1_score: Option<ScoreDto>,
    pub round2_score: Option<ScoreDto>,
}

impl From<&TeamSnapshot> for TeamDto {
    fn from(team: &TeamSnapshot) -> Self {
        Self {
            id: team.id.clone(),
            name: team.name.clone(),
            player_ids: team.player_ids.clone(),
            grid: grid_to_dto(&team.grid),
            round_target: team.round_target.as_ref().map(grid_to_dto),
            target_name: team.target_name.clone(),
            round1_grid: team.round1_grid.as_ref().map(grid_to_dto),
            round1_score: team.round1_score.as_ref().map(ScoreDto::from),
            round2_score: team.round2_score.as_ref().map(ScoreDto::from),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RoleDto {
    Architect,
    Builder,
}

impl From<Role> for RoleDto {
    fn from(role: Role) -> Self {
        match role {
            Role::Architect => RoleDto::Architect,
            Role::Builder => RoleDto::Builder,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDto {
    pub id: String,
    pub name: String,
    pub team_id: String,
    pub role: RoleDto,
    pub connected: bool,
    pub design_grid: Option<GridDto>,
}

impl From<&PlayerSnapshot> for PlayerDto {
    fn from(player: &PlayerSnapshot) -> Self {
        Self {
            id: player.id.clone(),
            name: player.name.clone(),
            team_id: player.team_id.clone(),
            role: player.role.into(),
            connected: player.connected,
            design_grid: player.design_grid.as_ref().map(grid_to_dto),
        }
    }
}

/// Full room state; clients can always resync from this alone.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateDto {
    pub code: String,
    pub phase: &'static str,
    pub theme: Option<String>,
    /// Epoch millis; `None` while untimed or paused.
    pub timer_end: Option<u64>,
    pub paused: bool,
    pub host_id: Option<String>,
    pub teams: Vec<TeamDto>,
    pub players: Vec<PlayerDto>,
}

impl From<&RoomSnapshot> for RoomStateDto {
    fn from(state: &RoomSnapshot) -> Self {
        Self {
            code: state.code.clone(),
            phase: state.phase.as_str(),
            theme: state.theme.clone(),
            timer_end: state.timer_end_ms,
            paused: state.paused,
            host_id: state.host_id.clone(),
            teams: state.teams.iter().map(TeamDto::from).collect(),
            players: state.players.iter().map(PlayerDto::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridUpdateDto {
    pub team_id: String,
    pub row: usize,
    pub col: usize,
    pub height: usize,
    pub block: BlockType,
}

impl From<GridDelta> for GridUpdateDto {
    fn from(delta: GridDelta) -> Self {
        Self {
            team_id: delta.team_id,
            row: delta.row,
            col: delta.col,
            height: delta.height,
            block: delta.block,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignUpdateDto {
    pub player_id: String,
    pub row: usize,
    pub col: usize,
    pub height: usize,
    pub block: BlockType,
}

impl From<DesignDelta> for DesignUpdateDto {
    fn from(delta: DesignDelta) -> Self {
        Self {
            player_id: delta.player_id,
            row: delta.row,
            col: delta.col,
            height: delta.height,
            block: delta.block,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDto {
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    #[serde(rename = "isAI")]
    pub is_ai: bool,
    pub team_id: String,
}

impl From<ChatLine> for ChatDto {
    fn from(line: ChatLine) -> Self {
        Self {
            sender_id: line.sender_id,
            sender_name: line.sender_name,
            text: line.text,
            is_ai: line.is_ai,
            team_id: line.team_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildActionDto {
    pub row: usize,
    pub col: usize,
    pub block: BlockType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<usize>,
}

impl From<BuildAction> for BuildActionDto {
    fn from(action: BuildAction) -> Self {
        Self {
            row: action.row,
            col: action.col,
            block: action.block,
            height: action.height,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiBuildingDto {
    pub team_id: String,
    pub actions: Vec<BuildActionDto>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiStatusDto {
    pub team_id: String,
    pub thinking: bool,
}

impl From<RoomEvent> for ServerMessage {
    fn from(event: RoomEvent) -> Self {
        match event {
            RoomEvent::State(state) => ServerMessage::State(RoomStateDto::from(&state)),
            RoomEvent::GridUpdate(delta) => ServerMessage::GridUpdate(delta.into()),
            RoomEvent::DesignUpdate(delta) => ServerMessage::DesignUpdate(delta.into()),
            RoomEvent::Chat(line) => ServerMessage::Chat(line.into()),
            RoomEvent::AiBuilding { team_id, actions } => ServerMessage::AiBuilding(AiBuildingDto {
                team_id,
                actions: actions.into_iter().map(BuildActionDto::from).collect(),
            }),
            RoomEvent::AiStatus { team_id, thinking } => {
                ServerMessage::AiStatus(AiStatusDto { team_id, thinking })
            }
            RoomEvent::Closed => ServerMessage::RoomClosed {},
        }
    }
}

/// Optional per-room overrides accepted by `POST /api/rooms`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomOptionsDto {
    pub design_phase: Option<bool>,
    pub demo_phase: Option<bool>,
    pub min_team_size: Option<usize>,
    pub max_team_size: Option<usize>,
}

impl RoomOptionsDto {
    /// Applies the overrides on top of `base`. `None` when the team bounds make no sense.
    pub fn apply(&self, base: RoomOptions) -> Option<RoomOptions> {
        let bounds = TeamBounds {
            min: self.min_team_size.unwrap_or(base.bounds.min),
            max: self.max_team_size.unwrap_or(base.bounds.max),
        };
        if bounds.min < 2 || bounds.min > bounds.max {
            return None;
        }
        Some(RoomOptions {
            toggles: PhaseToggles {
                design: self.design_phase.unwrap_or(base.toggles.design),
                demo: self.demo_phase.unwrap_or(base.toggles.demo),
                ..base.toggles
            },
            bounds,
            ..base
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub options: Option<RoomOptionsDto>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiChatRequest {
    pub text: String,
    pub room_code: String,
    pub team_id: String,
    pub player_id: String,
    #[serde(default)]
    pub target_grid: Option<GridDto>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiChatAccepted {
    pub request_id: u64,
}
