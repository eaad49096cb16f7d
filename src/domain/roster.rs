// Team and role assignment: join, leave, kick rebalancing, name/role mutators.

use crate::domain::grid::Grid;
use crate::domain::scoring::ScoreResult;
use std::collections::HashMap;

const MAX_PLAYER_NAME_LEN: usize = 24;
const MAX_TEAM_NAME_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Architect,
    Builder,
}

impl Role {
    pub fn swapped(self) -> Self {
        match self {
            Role::Architect => Role::Builder,
            Role::Builder => Role::Architect,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub team_id: String,
    pub role: Role,
    pub connected: bool,
    pub design_grid: Option<Grid>,
    /// Join order, used for deterministic tie breaks.
    pub seq: u64,
    /// Wall-clock millis of the last drop while still inside the grace window.
    pub disconnected_at_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Team {
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

impl Team {
    fn new(index: u64) -> Self {
        Self {
            id: format!("team-{index}"),
            name: format!("Team {index}"),
            player_ids: Vec::new(),
            grid: Grid::default(),
            round_target: None,
            target_name: None,
            round1_grid: None,
            round1_score: None,
            round2_score: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamBounds {
    pub min: usize,
    pub max: usize,
}

impl Default for TeamBounds {
    fn default() -> Self {
        Self { min: 2, max: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterError {
    UnknownPlayer,
    NoTeams,
    TeamSize { team_id: String, size: usize },
    Unbalanced { team_id: String },
    InvalidName,
}

impl std::fmt::Display for RosterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RosterError::UnknownPlayer => f.write_str("unknown player"),
            RosterError::NoTeams => f.write_str("no teams yet"),
            RosterError::TeamSize { team_id, size } => {
                write!(f, "{team_id} has {size} players")
            }
            RosterError::Unbalanced { team_id } => write!(f, "{team_id} needs both roles"),
            RosterError::InvalidName => f.write_str("invalid name"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Roster {
    bounds: TeamBounds,
    teams: Vec<Team>,
    players: HashMap<String, Player>,
    next_player_seq: u64,
    next_team_seq: u64,
}

impl Roster {
    pub fn new(bounds: TeamBounds) -> Self {
        Self {
            bounds,
            teams: Vec::new(),
            players: HashMap::new(),
            next_player_seq: 1,
            next_team_seq: 1,
        }
    }

    pub fn bounds(&self) -> TeamBounds {
        self.bounds
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn teams_mut(&mut self) -> impl Iterator<Item = &mut Team> {
        self.teams.iter_mut()
    }

    pub fn team(&self, team_id: &str) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == team_id)
    }

    pub fn team_mut(&mut self, team_id: &str) -> Option<&mut Team> {
        self.teams.iter_mut().find(|t| t.id == team_id)
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.get(player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.get_mut(player_id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Players in join order.
    pub fn players_in_order(&self) -> Vec<&Player> {
        let mut players: Vec<&Player> = self.players.values().collect();
        players.sort_by_key(|p| p.seq);
        players
    }

    pub fn players_in_order_mut(&mut self) -> Vec<&mut Player> {
        let mut players: Vec<&mut Player> = self.players.values_mut().collect();
        players.sort_by_key(|p| p.seq);
        players
    }

    /// Adds a player to the smallest team, creating a team when all are full.
    ///
    /// With `rebalance` set (lobby only) members are shifted into a freshly created
    /// team until team sizes differ by at most one.
    pub fn join(&mut self, player_id: String, name: &str, rebalance: bool) -> &Player {
        let seq = self.next_player_seq;
        self.next_player_seq += 1;

        let needs_team = self.teams.is_empty()
            || self
                .teams
                .iter()
                .all(|t| t.player_ids.len() >= self.bounds.max);
        if needs_team {
            self.teams.push(Team::new(self.next_team_seq));
            self.next_team_seq += 1;
        }

        let team_idx = self.smallest_team_idx().unwrap_or(0);
        let role = self.next_role(team_idx);
        let team_id = self.teams[team_idx].id.clone();
        self.teams[team_idx].player_ids.push(player_id.clone());

        self.players.insert(
            player_id.clone(),
            Player {
                id: player_id.clone(),
                name: clean_player_name(name).unwrap_or_else(|| format!("Player {seq}")),
                team_id,
                role,
                connected: true,
                design_grid: None,
                seq,
                disconnected_at_ms: None,
            },
        );

        if rebalance {
            self.even_out_team_sizes();
        }

        &self.players[&player_id]
    }

    /// Removes a player and fixes the role split of the team it leaves.
    pub fn remove(&mut self, player_id: &str, drop_empty_team: bool) -> Option<Player> {
        let player = self.players.remove(player_id)?;
        if let Some(idx) = self.teams.iter().position(|t| t.id == player.team_id) {
            self.teams[idx].player_ids.retain(|id| id != player_id);
            if self.teams[idx].player_ids.is_empty() && drop_empty_team {
                self.teams.remove(idx);
            } else {
                self.rebalance_roles(idx);
            }
        }
        Some(player)
    }

    /// Flips every player's role (entering round two).
    pub fn swap_roles(&mut self) {
        for player in self.players.values_mut() {
            player.role = player.role.swapped();
        }
    }

    pub fn members_with_role(&self, team_id: &str, role: Role) -> Vec<&Player> {
        let Some(team) = self.team(team_id) else {
            return Vec::new();
        };
        team.player_ids
            .iter()
            .filter_map(|id| self.players.get(id))
            .filter(|p| p.role == role)
            .collect()
    }

    /// Checks the start-of-game guard: team sizes in bounds and a balanced split.
    pub fn ready_to_start(&self) -> Result<(), RosterError> {
        if self.teams.is_empty() {
            return Err(RosterError::NoTeams);
        }
        for team in &self.teams {
            let size = team.player_ids.len();
            if size < self.bounds.min || size > self.bounds.max {
                return Err(RosterError::TeamSize {
                    team_id: team.id.clone(),
                    size,
                });
            }
            let (architects, builders) = self.role_counts(team);
            if architects == 0 || builders == 0 || architects.abs_diff(builders) > 1 {
                return Err(RosterError::Unbalanced {
                    team_id: team.id.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn set_team_name(&mut self, player_id: &str, name: &str) -> Result<(), RosterError> {
        let team_id = self
            .players
            .get(player_id)
            .map(|p| p.team_id.clone())
            .ok_or(RosterError::UnknownPlayer)?;
        let name = clean_name(name, MAX_TEAM_NAME_LEN).ok_or(RosterError::InvalidName)?;
        if let Some(team) = self.team_mut(&team_id) {
            team.name = name;
        }
        Ok(())
    }

    fn role_counts(&self, team: &Team) -> (usize, usize) {
        team.player_ids
            .iter()
            .filter_map(|id| self.players.get(id))
            .fold((0, 0), |(a, b), p| match p.role {
                Role::Architect => (a + 1, b),
                Role::Builder => (a, b + 1),
            })
    }

    fn smallest_team_idx(&self) -> Option<usize> {
        self.teams
            .iter()
            .enumerate()
            .min_by_key(|(idx, t)| (t.player_ids.len(), *idx))
            .map(|(idx, _)| idx)
    }

    fn largest_team_idx(&self) -> Option<usize> {
        self.teams
            .iter()
            .enumerate()
            .max_by_key(|(idx, t)| (t.player_ids.len(), std::cmp::Reverse(*idx)))
            .map(|(idx, _)| idx)
    }

    fn next_role(&self, team_idx: usize) -> Role {
        let (architects, builders) = self.role_counts(&self.teams[team_idx]);
        if architects <= builders {
            Role::Architect
        } else {
            Role::Builder
        }
    }

    fn even_out_team_sizes(&mut self) {
        loop {
            let (Some(big), Some(small)) = (self.largest_team_idx(), self.smallest_team_idx())
            else {
                return;
            };
            let big_len = self.teams[big].player_ids.len();
            let small_len = self.teams[small].player_ids.len();
            if big_len <= small_len + 1 {
                return;
            }

            // Move the latest joiner of the big team.
            let Some(mover) = self.latest_member(big) else {
                return;
            };
            self.teams[big].player_ids.retain(|id| *id != mover);
            let role = self.next_role(small);
            let small_id = self.teams[small].id.clone();
            self.teams[small].player_ids.push(mover.clone());
            if let Some(player) = self.players.get_mut(&mover) {
                player.team_id = small_id;
                player.role = role;
            }
            self.rebalance_roles(big);
        }
    }

    fn latest_member(&self, team_idx: usize) -> Option<String> {
        self.teams[team_idx]
            .player_ids
            .iter()
            .filter_map(|id| self.players.get(id))
            .max_by_key(|p| p.seq)
            .map(|p| p.id.clone())
    }

    /// Flips the latest joiners of the over-represented role until the split is even.
    ///
    /// A team left with a single member keeps a builder, so its grid can still change.
    fn rebalance_roles(&mut self, team_idx: usize) {
        loop {
            let (architects, builders) = self.role_counts(&self.teams[team_idx]);
            let over = if architects > builders + 1 || (builders == 0 && architects > 0) {
                Role::Architect
            } else if builders > architects + 1 || (architects == 0 && builders > 1) {
                Role::Builder
            } else {
                return;
            };
            let flip = self.teams[team_idx]
                .player_ids
                .iter()
                .filter_map(|id| self.players.get(id))
                .filter(|p| p.role == over)
                .max_by_key(|p| p.seq)
                .map(|p| p.id.clone());
            match flip.and_then(|id| self.players.get_mut(&id)) {
                Some(player) => player.role = over.swapped(),
                None => return,
            }
        }
    }
}

fn clean_name(value: &str, max_len: usize) -> Option<String> {
    let cleaned: String = value.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    let len = cleaned.chars().count();
    if len == 0 || len > max_len {
        return None;
    }
    Some(cleaned.to_string())
}

fn clean_player_name(value: &str) -> Option<String> {
    clean_name(value, MAX_PLAYER_NAME_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster_with(bounds: TeamBounds, names: &[&str]) -> Roster {
        let mut roster = Roster::new(bounds);
        for (idx, name) in names.iter().enumerate() {
            roster.join(format!("p{idx}"), name, true);
        }
        roster
    }

    fn sizes(roster: &Roster) -> Vec<usize> {
        roster.teams().iter().map(|t| t.player_ids.len()).collect()
    }

    #[test]
    fn first_two_players_share_a_team_with_split_roles() {
        let roster = roster_with(TeamBounds::default(), &["Ada", "Bo"]);
        assert_eq!(sizes(&roster), vec![2]);
        assert_eq!(roster.player("p0").map(|p| p.role), Some(Role::Architect));
        assert_eq!(roster.player("p1").map(|p| p.role), Some(Role::Builder));
        assert_eq!(roster.ready_to_start(), Ok(()));
    }

    #[test]
    fn new_team_is_created_when_all_are_full() {
        let roster = roster_with(TeamBounds::default(), &["a", "b", "c"]);
        assert_eq!(sizes(&roster), vec![2, 1]);
        assert_eq!(
            roster.ready_to_start(),
            Err(RosterError::TeamSize {
                team_id: "team-2".to_string(),
                size: 1
            })
        );
    }

    #[test]
    fn lobby_rebalancing_keeps_sizes_within_one() {
        let bounds = TeamBounds { min: 2, max: 4 };
        let mut roster = Roster::new(bounds);
        for idx in 0..11 {
            roster.join(format!("p{idx}"), "x", true);
            let s = sizes(&roster);
            let (min, max) = (s.iter().min().copied(), s.iter().max().copied());
            assert!(max.unwrap_or(0) - min.unwrap_or(0) <= 1, "sizes {s:?}");
            for team in roster.teams() {
                let (a, b) = roster.role_counts(team);
                assert!(a.abs_diff(b) <= 1, "roles in {}", team.id);
            }
        }
    }

    #[test]
    fn kick_rebalances_roles() {
        let bounds = TeamBounds { min: 2, max: 4 };
        let mut roster = roster_with(bounds, &["a", "b", "c", "d"]);
        // a, c architects; b, d builders.
        roster.remove("p1", true);
        roster.remove("p3", true);
        let team_id = roster.teams()[0].id.clone();
        assert_eq!(roster.members_with_role(&team_id, Role::Architect).len(), 1);
        assert_eq!(roster.members_with_role(&team_id, Role::Builder).len(), 1);
        assert_eq!(roster.player("p2").map(|p| p.role), Some(Role::Builder));
    }

    #[test]
    fn last_member_of_a_team_becomes_builder() {
        let mut roster = roster_with(TeamBounds::default(), &["a", "b", "c", "d"]);
        // team-2: c architect, d builder.
        roster.remove("p3", false);
        assert_eq!(roster.player("p2").map(|p| p.role), Some(Role::Builder));

        let mut roster = roster_with(TeamBounds { min: 2, max: 4 }, &["a", "b", "c"]);
        // a, c architects; b builder.
        roster.remove("p1", false);
        assert_eq!(roster.members_with_role("team-1", Role::Builder).len(), 1);
        assert_eq!(roster.members_with_role("team-1", Role::Architect).len(), 1);
    }

    #[test]
    fn empty_team_is_dropped_only_when_asked() {
        let mut roster = roster_with(TeamBounds::default(), &["a", "b", "c"]);
        roster.remove("p2", false);
        assert_eq!(roster.teams().len(), 2);
        roster.remove("p0", true);
        assert_eq!(roster.teams().len(), 2);
        assert!(roster.remove("missing", true).is_none());
    }

    #[test]
    fn swap_roles_flips_everyone() {
        let mut roster = roster_with(TeamBounds::default(), &["a", "b"]);
        roster.swap_roles();
        assert_eq!(roster.player("p0").map(|p| p.role), Some(Role::Builder));
        assert_eq!(roster.player("p1").map(|p| p.role), Some(Role::Architect));
    }

    #[test]
    fn names_are_cleaned() {
        let mut roster = Roster::new(TeamBounds::default());
        let name = roster.join("x".to_string(), "   ", true).name.clone();
        assert_eq!(name, "Player 1");
        assert_eq!(
            roster.set_team_name("x", "  The\u{7} Builders "),
            Ok(())
        );
        assert_eq!(roster.teams()[0].name, "The Builders");
        assert_eq!(
            roster.set_team_name("x", &"n".repeat(40)),
            Err(RosterError::InvalidName)
        );
        assert_eq!(
            roster.set_team_name("ghost", "ok"),
            Err(RosterError::UnknownPlayer)
        );
    }
}
