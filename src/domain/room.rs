// Room aggregate: the single authoritative owner of one session's phase, roster and grids.
//
// Everything here is synchronous and takes the wall clock as an argument; the room actor
// in the use-case layer owns the timers and the I/O.

use crate::domain::ai_actions::BuildAction;
use crate::domain::block::BlockType;
use crate::domain::grid::{Grid, GridError, LayerChange};
use crate::domain::phase::{Phase, PhaseToggles, Trigger, next_phase};
use crate::domain::room_code::RoomCode;
use crate::domain::roster::{Player, Role, Roster, RosterError, Team, TeamBounds};
use crate::domain::scoring::{ScoreResult, calculate_score};
use crate::domain::targets::{self, Round};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

const MAX_THEME_LEN: usize = 32;

/// Phase lengths in milliseconds; zero leaves the phase untimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDurations {
    pub design_ms: u64,
    pub demo_ms: u64,
    pub round_ms: u64,
    pub interstitial_ms: u64,
}

impl Default for PhaseDurations {
    fn default() -> Self {
        Self {
            design_ms: 180_000,
            demo_ms: 60_000,
            round_ms: 300_000,
            interstitial_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomOptions {
    pub toggles: PhaseToggles,
    pub bounds: TeamBounds,
    pub durations: PhaseDurations,
    pub reconnect_grace_ms: u64,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            toggles: PhaseToggles::default(),
            bounds: TeamBounds::default(),
            durations: PhaseDurations::default(),
            reconnect_grace_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    StartRound,
    SkipToReveal,
    Pause,
    NextReveal,
    KickPlayer { target_player_id: String },
    EndGame,
}

impl HostAction {
    pub fn name(&self) -> &'static str {
        match self {
            HostAction::StartRound => "startRound",
            HostAction::SkipToReveal => "skipToReveal",
            HostAction::Pause => "pause",
            HostAction::NextReveal => "nextReveal",
            HostAction::KickPlayer { .. } => "kickPlayer",
            HostAction::EndGame => "endGame",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    RoomClosed,
    NotHost,
    UnknownPlayer,
    UndefinedTransition { phase: Phase, action: &'static str },
    NotTimed,
    CannotKickSelf,
    NotTeamMember,
    NotBuilder,
    Roster(RosterError),
    InvalidTheme,
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::RoomClosed => f.write_str("room is closed"),
            StateError::NotHost => f.write_str("only the host may do that"),
            StateError::UnknownPlayer => f.write_str("unknown player"),
            StateError::UndefinedTransition { phase, action } => {
                write!(f, "{action} is not allowed during {phase}")
            }
            StateError::NotTimed => f.write_str("phase has no timer"),
            StateError::CannotKickSelf => f.write_str("host cannot kick itself"),
            StateError::NotTeamMember => f.write_str("player is not on that team"),
            StateError::NotBuilder => f.write_str("only the builder may do that"),
            StateError::Roster(err) => write!(f, "{err}"),
            StateError::InvalidTheme => f.write_str("invalid theme"),
        }
    }
}

impl std::error::Error for StateError {}

/// Observable result of a host action or timer expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomChange {
    PhaseChanged { from: Phase, to: Phase },
    Paused,
    Resumed,
    Kicked { player_id: String },
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridDelta {
    pub team_id: String,
    pub row: usize,
    pub col: usize,
    pub height: usize,
    pub block: BlockType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignDelta {
    pub player_id: String,
    pub row: usize,
    pub col: usize,
    pub height: usize,
    pub block: BlockType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Team(Vec<GridDelta>),
    Design(Vec<DesignDelta>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceError {
    UnknownPlayer,
    NotAllowed { phase: Phase, role: Role },
    Grid(GridError),
}

impl std::fmt::Display for PlaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaceError::UnknownPlayer => f.write_str("unknown player"),
            PlaceError::NotAllowed { phase, role } => {
                write!(f, "{role:?} cannot place blocks during {phase}")
            }
            PlaceError::Grid(err) => write!(f, "{err}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssistantOutcome {
    pub applied: Vec<BuildAction>,
    pub deltas: Vec<GridDelta>,
    pub failed: Vec<(BuildAction, GridError)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub player_id: String,
    pub rejoined: bool,
}

#[derive(Debug, Clone)]
pub struct PlayerSnapshot {
    pub id: String,
    pub name: String,
    pub team_id: String,
    pub role: Role,
    pub connected: bool,
    pub design_grid: Option<Grid>,
}

#[derive(Debug, Clone)]
pub struct TeamSnapshot {
    pub id: String,
    pub name: String,
    pub player_ids: Vec<String>,
    pub grid: Grid,
    pub round_target: Option<Grid>,
    pub target_name: Option<String>,
    pub round1_grid: Option<Grid>,
    pub round1_score: Option<ScoreResult>,
    pub round2_score: Option<ScoreResult>,
}

#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub code: String,
    pub phase: Phase,
    pub theme: Option<String>,
    pub timer_end_ms: Option<u64>,
    pub paused: bool,
    pub host_id: Option<String>,
    pub teams: Vec<TeamSnapshot>,
    pub players: Vec<PlayerSnapshot>,
}

pub struct Room {
    code: RoomCode,
    phase: Phase,
    theme: Option<String>,
    timer_end_ms: Option<u64>,
    paused_remaining_ms: Option<u64>,
    host_id: Option<String>,
    roster: Roster,
    options: RoomOptions,
    rng: StdRng,
    closed: bool,
}

impl Room {
    pub fn new(code: RoomCode, options: RoomOptions, seed: u64) -> Self {
        Self {
            code,
            phase: Phase::Lobby,
            theme: None,
            timer_end_ms: None,
            paused_remaining_ms: None,
            host_id: None,
            roster: Roster::new(options.bounds),
            options,
            rng: StdRng::seed_from_u64(seed),
            closed: false,
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn timer_end_ms(&self) -> Option<u64> {
        self.timer_end_ms
    }

    pub fn host_id(&self) -> Option<&str> {
        self.host_id.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stops the clock and rejects every further mutation.
    pub fn close(&mut self) {
        self.closed = true;
        self.timer_end_ms = None;
        self.paused_remaining_ms = None;
    }

    pub fn team(&self, team_id: &str) -> Option<&Team> {
        self.roster.team(team_id)
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.roster.player(player_id)
    }

    pub fn players(&self) -> Vec<&Player> {
        self.roster.players_in_order()
    }

    /// Creates a player; the first one to join becomes host.
    pub fn join(&mut self, player_id: String, name: &str) -> JoinOutcome {
        let rebalance = self.phase == Phase::Lobby;
        let in_design = self.phase == Phase::Design;
        let player = self.roster.join(player_id.clone(), name, rebalance);
        let id = player.id.clone();
        if in_design {
            if let Some(player) = self.roster.player_mut(&id) {
                player.design_grid = Some(Grid::default());
            }
        }
        if self.host_id.is_none() {
            self.host_id = Some(id.clone());
        }
        JoinOutcome {
            player_id: id,
            rejoined: false,
        }
    }

    /// Rebinds a returning player; team, role and grids are untouched.
    pub fn rejoin(&mut self, player_id: &str) -> Result<JoinOutcome, StateError> {
        let player = self
            .roster
            .player_mut(player_id)
            .ok_or(StateError::UnknownPlayer)?;
        player.connected = true;
        player.disconnected_at_ms = None;
        if self.host_id.is_none() {
            self.host_id = Some(player_id.to_string());
        }
        Ok(JoinOutcome {
            player_id: player_id.to_string(),
            rejoined: true,
        })
    }

    /// Starts the grace window for a dropped connection. The seat is kept.
    pub fn disconnect(&mut self, player_id: &str, now_ms: u64) {
        if let Some(player) = self.roster.player_mut(player_id) {
            if player.connected {
                player.disconnected_at_ms = Some(now_ms);
            }
        }
    }

    pub fn next_grace_deadline_ms(&self) -> Option<u64> {
        let grace = self.options.reconnect_grace_ms;
        self.roster
            .players_in_order()
            .iter()
            .filter_map(|p| p.disconnected_at_ms)
            .map(|at| at.saturating_add(grace))
            .min()
    }

    /// Flags players whose grace window elapsed as disconnected. Returns true on change.
    pub fn expire_grace(&mut self, now_ms: u64) -> bool {
        let grace = self.options.reconnect_grace_ms;
        let mut changed = false;
        for player in self.roster.players_in_order_mut() {
            let expired = player
                .disconnected_at_ms
                .is_some_and(|at| at.saturating_add(grace) <= now_ms);
            if expired {
                player.connected = false;
                player.disconnected_at_ms = None;
                changed = true;
            }
        }

        let host_gone = self
            .host_id
            .as_deref()
            .and_then(|id| self.roster.player(id))
            .is_none_or(|host| !host.connected);
        if changed && host_gone {
            let successor = self
                .roster
                .players_in_order()
                .into_iter()
                .find(|p| p.connected && p.disconnected_at_ms.is_none())
                .map(|p| p.id.clone());
            // Nobody left to take over: keep the old host until someone returns.
            if successor.is_some() {
                self.host_id = successor;
            }
        }
        changed
    }

    pub fn host_action(
        &mut self,
        sender_id: &str,
        action: HostAction,
        now_ms: u64,
    ) -> Result<RoomChange, StateError> {
        if self.closed {
            return Err(StateError::RoomClosed);
        }
        if self.host_id.as_deref() != Some(sender_id) {
            return Err(StateError::NotHost);
        }

        match action {
            HostAction::StartRound => self.advance(Trigger::StartRound, "startRound", now_ms),
            HostAction::SkipToReveal => self.advance(Trigger::SkipToReveal, "skipToReveal", now_ms),
            HostAction::NextReveal => self.advance(Trigger::NextReveal, "nextReveal", now_ms),
            HostAction::Pause => self.toggle_pause(now_ms),
            HostAction::KickPlayer { target_player_id } => self.kick(sender_id, &target_player_id),
            HostAction::EndGame => {
                self.close();
                Ok(RoomChange::Ended)
            }
        }
    }

    /// Fires the phase timer if its deadline has passed.
    pub fn timer_expired(&mut self, now_ms: u64) -> Option<RoomChange> {
        let end = self.timer_end_ms?;
        if self.closed || end > now_ms {
            return None;
        }
        match self.advance(Trigger::TimerExpired, "timer", now_ms) {
            Ok(change) => Some(change),
            Err(_) => {
                // Nothing to advance to; stop the clock rather than re-firing.
                self.timer_end_ms = None;
                None
            }
        }
    }

    pub fn place_block(
        &mut self,
        player_id: &str,
        row: i64,
        col: i64,
        block: BlockType,
    ) -> Result<Placement, PlaceError> {
        let phase = self.phase;
        let player = self
            .roster
            .player(player_id)
            .ok_or(PlaceError::UnknownPlayer)?;
        let role = player.role;
        let team_id = player.team_id.clone();

        // Design edits go to private grids below; only demo shares the team grid freely.
        let allowed_on_team = if phase.is_round() {
            role == Role::Builder
        } else {
            phase.is_practice()
        };

        if phase == Phase::Design && !self.closed {
            let Some(player) = self.roster.player_mut(player_id) else {
                return Err(PlaceError::UnknownPlayer);
            };
            let grid = player.design_grid.get_or_insert_with(Grid::default);
            let (row, col) = grid.checked_cell(row, col).map_err(PlaceError::Grid)?;
            let changes = grid.place_block(row, col, block).map_err(PlaceError::Grid)?;
            return Ok(Placement::Design(
                changes
                    .into_iter()
                    .map(|c| DesignDelta {
                        player_id: player_id.to_string(),
                        row: c.row,
                        col: c.col,
                        height: c.height,
                        block: c.block,
                    })
                    .collect(),
            ));
        }

        if !allowed_on_team || self.closed {
            return Err(PlaceError::NotAllowed { phase, role });
        }

        let Some(team) = self.roster.team_mut(&team_id) else {
            return Err(PlaceError::UnknownPlayer);
        };
        let (row, col) = team.grid.checked_cell(row, col).map_err(PlaceError::Grid)?;
        let changes = team
            .grid
            .place_block(row, col, block)
            .map_err(PlaceError::Grid)?;
        Ok(Placement::Team(to_grid_deltas(&team_id, changes)))
    }

    /// Checks that `player_id` may ask the assistant for help on behalf of `team_id` now.
    pub fn check_assistant_request(&self, player_id: &str, team_id: &str) -> Result<(), StateError> {
        if self.closed {
            return Err(StateError::RoomClosed);
        }
        let player = self
            .roster
            .player(player_id)
            .ok_or(StateError::UnknownPlayer)?;
        if player.team_id != team_id {
            return Err(StateError::NotTeamMember);
        }
        if self.phase != Phase::Round2 {
            return Err(StateError::UndefinedTransition {
                phase: self.phase,
                action: "aiChat",
            });
        }
        if player.role != Role::Builder {
            return Err(StateError::NotBuilder);
        }
        Ok(())
    }

    /// Applies validated assistant actions to a team grid. Only valid during round two.
    pub fn apply_assistant_actions(
        &mut self,
        team_id: &str,
        actions: &[BuildAction],
    ) -> AssistantOutcome {
        let mut outcome = AssistantOutcome::default();
        if self.phase != Phase::Round2 || self.closed {
            return outcome;
        }
        let Some(team) = self.roster.team_mut(team_id) else {
            return outcome;
        };

        for action in actions {
            let result = match action.height {
                Some(height) => team.grid.place_at(action.row, action.col, height, action.block),
                None => team.grid.place_block(action.row, action.col, action.block),
            };
            match result {
                Ok(changes) => {
                    outcome.applied.push(*action);
                    outcome.deltas.extend(to_grid_deltas(team_id, changes));
                }
                Err(err) => outcome.failed.push((*action, err)),
            }
        }
        outcome
    }

    pub fn set_theme(&mut self, sender_id: &str, theme: &str) -> Result<(), StateError> {
        if self.closed {
            return Err(StateError::RoomClosed);
        }
        if self.host_id.as_deref() != Some(sender_id) {
            return Err(StateError::NotHost);
        }
        if !matches!(self.phase, Phase::Lobby | Phase::Design) {
            return Err(StateError::UndefinedTransition {
                phase: self.phase,
                action: "setTheme",
            });
        }
        let theme = theme.trim();
        if theme.chars().count() > MAX_THEME_LEN || theme.chars().any(char::is_control) {
            return Err(StateError::InvalidTheme);
        }
        self.theme = if theme.is_empty() {
            None
        } else {
            Some(theme.to_string())
        };
        Ok(())
    }

    pub fn set_team_name(&mut self, sender_id: &str, name: &str) -> Result<(), StateError> {
        if self.closed {
            return Err(StateError::RoomClosed);
        }
        if self.phase == Phase::Summary {
            return Err(StateError::UndefinedTransition {
                phase: self.phase,
                action: "setTeamName",
            });
        }
        self.roster
            .set_team_name(sender_id, name)
            .map_err(StateError::Roster)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.to_string(),
            phase: self.phase,
            theme: self.theme.clone(),
            timer_end_ms: self.timer_end_ms,
            paused: self.paused_remaining_ms.is_some(),
            host_id: self.host_id.clone(),
            teams: self
                .roster
                .teams()
                .iter()
                .map(|t| TeamSnapshot {
                    id: t.id.clone(),
                    name: t.name.clone(),
                    player_ids: t.player_ids.clone(),
                    grid: t.grid.clone(),
                    round_target: t.round_target.clone(),
                    target_name: t.target_name.clone(),
                    round1_grid: t.round1_grid.clone(),
                    round1_score: t.round1_score.clone(),
                    round2_score: t.round2_score.clone(),
                })
                .collect(),
            players: self
                .roster
                .players_in_order()
                .into_iter()
                .map(|p| PlayerSnapshot {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    team_id: p.team_id.clone(),
                    role: p.role,
                    connected: p.connected,
                    design_grid: p.design_grid.clone(),
                })
                .collect(),
        }
    }

    fn advance(
        &mut self,
        trigger: Trigger,
        action: &'static str,
        now_ms: u64,
    ) -> Result<RoomChange, StateError> {
        let from = self.phase;
        let to = next_phase(from, trigger, self.options.toggles)
            .ok_or(StateError::UndefinedTransition { phase: from, action })?;

        if from == Phase::Lobby {
            self.roster.ready_to_start().map_err(StateError::Roster)?;
        }

        self.phase = to;
        self.enter_phase(to);
        self.paused_remaining_ms = None;
        self.timer_end_ms = self
            .phase_duration_ms(to)
            .map(|duration| now_ms.saturating_add(duration));
        Ok(RoomChange::PhaseChanged { from, to })
    }

    fn enter_phase(&mut self, phase: Phase) {
        match phase {
            Phase::Design => {
                for player in self.roster.players_in_order_mut() {
                    player.design_grid.get_or_insert_with(Grid::default);
                }
            }
            Phase::Demo => self.clear_team_grids(),
            Phase::Round1 => {
                self.clear_team_grids();
                self.assign_targets(Round::One);
            }
            Phase::Reveal1 => {
                for team in self.roster.teams_mut() {
                    let target = team.round_target.clone().unwrap_or_default();
                    team.round1_score = Some(calculate_score(&team.grid, &target));
                    // Deep copy; the live grid keeps changing afterwards.
                    if team.round1_grid.is_none() {
                        team.round1_grid = Some(team.grid.clone());
                    }
                }
            }
            Phase::Round2 => {
                self.roster.swap_roles();
                self.clear_team_grids();
                self.assign_targets(Round::Two);
            }
            Phase::FinalReveal => {
                for team in self.roster.teams_mut() {
                    let target = team.round_target.clone().unwrap_or_default();
                    team.round2_score = Some(calculate_score(&team.grid, &target));
                }
            }
            Phase::Lobby | Phase::Interstitial | Phase::Summary => {}
        }
    }

    fn phase_duration_ms(&self, phase: Phase) -> Option<u64> {
        let d = self.options.durations;
        let duration = match phase {
            Phase::Design => d.design_ms,
            Phase::Demo => d.demo_ms,
            Phase::Round1 | Phase::Round2 => d.round_ms,
            Phase::Interstitial if self.options.toggles.timed_interstitial => d.interstitial_ms,
            _ => 0,
        };
        (duration > 0).then_some(duration)
    }

    fn clear_team_grids(&mut self) {
        for team in self.roster.teams_mut() {
            team.grid.clear();
        }
    }

    fn assign_targets(&mut self, round: Round) {
        let catalog = targets::pool(round, self.theme.as_deref());

        // Player designs from the design phase, keyed by authoring team.
        let designs: Vec<(String, String, Grid)> = if round == Round::One {
            self.roster
                .players_in_order()
                .into_iter()
                .filter_map(|p| {
                    let grid = p.design_grid.as_ref()?;
                    (!grid.is_empty()).then(|| {
                        (p.team_id.clone(), format!("{}'s design", p.name), grid.clone())
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        let team_ids: Vec<String> = self.roster.teams().iter().map(|t| t.id.clone()).collect();
        for team_id in team_ids {
            let foreign: Vec<&(String, String, Grid)> =
                designs.iter().filter(|(author, _, _)| *author != team_id).collect();
            let (name, grid) = match foreign.choose(&mut self.rng) {
                Some((_, name, grid)) => (name.clone(), grid.clone()),
                None => match catalog.choose(&mut self.rng) {
                    Some(spec) => (spec.name.to_string(), spec.build()),
                    None => ("open build".to_string(), Grid::default()),
                },
            };
            if let Some(team) = self.roster.team_mut(&team_id) {
                team.round_target = Some(grid);
                team.target_name = Some(name);
            }
        }
    }

    fn toggle_pause(&mut self, now_ms: u64) -> Result<RoomChange, StateError> {
        if let Some(remaining) = self.paused_remaining_ms.take() {
            self.timer_end_ms = Some(now_ms.saturating_add(remaining));
            return Ok(RoomChange::Resumed);
        }
        let Some(end) = self.timer_end_ms.take() else {
            return Err(StateError::NotTimed);
        };
        self.paused_remaining_ms = Some(end.saturating_sub(now_ms));
        Ok(RoomChange::Paused)
    }

    fn kick(&mut self, sender_id: &str, target_id: &str) -> Result<RoomChange, StateError> {
        if self.phase == Phase::Summary {
            return Err(StateError::UndefinedTransition {
                phase: self.phase,
                action: "kickPlayer",
            });
        }
        if sender_id == target_id {
            return Err(StateError::CannotKickSelf);
        }
        let drop_empty_team = self.phase == Phase::Lobby;
        self.roster
            .remove(target_id, drop_empty_team)
            .ok_or(StateError::UnknownPlayer)?;
        Ok(RoomChange::Kicked {
            player_id: target_id.to_string(),
        })
    }
}

fn to_grid_deltas(team_id: &str, changes: Vec<LayerChange>) -> Vec<GridDelta> {
    changes
        .into_iter()
        .map(|c| GridDelta {
            team_id: team_id.to_string(),
            row: c.row,
            col: c.col,
            height: c.height,
            block: c.block,
        })
        .collect()
}
