// Room actor: owns one `Room`, applies commands in arrival order and drives its timers.

use crate::domain::ai_actions::{ActionBounds, parse_reply};
use crate::domain::errors::{AiError, JoinError};
use crate::domain::phase::Phase;
use crate::domain::ports::{ChatRole, ChatTurn, Clock, CompletionClient};
use crate::domain::room::{Placement, Room, RoomChange, StateError};
use crate::use_cases::assistant::{ConversationHistory, build_messages, clean_request};
use crate::use_cases::types::{
    AssistantRejection, AssistantRequest, ChatLine, CloseReason, JoinAccepted, RoomCommand,
    RoomEvent,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

pub const MAX_CHAT_CHARS: usize = 280;
const ASSISTANT_SENDER_ID: &str = "assistant";
const ASSISTANT_SENDER_NAME: &str = "Assistant";

/// Collaborators the room actor needs from the outside world.
#[derive(Clone)]
pub struct RoomDeps {
    pub clock: Arc<dyn Clock>,
    pub assistant: Arc<dyn CompletionClient>,
    pub assistant_timeout: Duration,
    /// Close the room after this long without live connections. Zero disables it.
    pub idle_timeout: Duration,
}

struct Binding {
    token: u64,
    close_tx: oneshot::Sender<CloseReason>,
}

struct PendingRequest {
    id: u64,
    abort: AbortHandle,
}

struct RoomActor {
    room: Room,
    deps: RoomDeps,
    events_tx: broadcast::Sender<RoomEvent>,
    // Weak so that in-flight assistant calls do not keep the room alive.
    self_tx: mpsc::WeakSender<RoomCommand>,
    bindings: HashMap<String, Binding>,
    kicked: HashSet<String>,
    pending: HashMap<String, PendingRequest>,
    histories: HashMap<String, ConversationHistory>,
    next_request_id: u64,
    idle_since_ms: Option<u64>,
}

pub async fn room_task(
    room: Room,
    mut commands: mpsc::Receiver<RoomCommand>,
    self_tx: mpsc::WeakSender<RoomCommand>,
    events_tx: broadcast::Sender<RoomEvent>,
    deps: RoomDeps,
) {
    let span = info_span!("room", room_code = %room.code());
    let now = deps.clock.now_epoch_millis();
    let mut actor = RoomActor {
        room,
        deps,
        events_tx,
        self_tx,
        bindings: HashMap::new(),
        kicked: HashSet::new(),
        pending: HashMap::new(),
        histories: HashMap::new(),
        next_request_id: 1,
        idle_since_ms: Some(now),
    };

    async move {
        info!("room opened");
        loop {
            let wake_at = actor.next_wake();
            tokio::select! {
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("command channel closed");
                        break;
                    };
                    actor.handle(cmd);
                }
                _ = sleep_until_deadline(wake_at) => {
                    actor.on_wake();
                }
            }

            if actor.room.is_closed() {
                break;
            }
        }
        actor.shutdown();
        info!("room closed");
    }
    .instrument(span)
    .await
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl RoomActor {
    fn now(&self) -> u64 {
        self.deps.clock.now_epoch_millis()
    }

    fn publish(&self, event: RoomEvent) {
        // No receivers is fine: nobody is connected yet.
        let _ = self.events_tx.send(event);
    }

    fn publish_state(&self) {
        self.publish(RoomEvent::State(self.room.snapshot()));
    }

    fn idle_deadline_ms(&self) -> Option<u64> {
        if self.deps.idle_timeout.is_zero() {
            return None;
        }
        let idle_ms = self.deps.idle_timeout.as_millis() as u64;
        self.idle_since_ms.map(|since| since.saturating_add(idle_ms))
    }

    /// Earliest of the phase timer, grace windows and the idle deadline.
    fn next_wake(&self) -> Option<Instant> {
        let now = self.now();
        [
            self.room.timer_end_ms(),
            self.room.next_grace_deadline_ms(),
            self.idle_deadline_ms(),
        ]
        .into_iter()
        .flatten()
        .min()
        .map(|at| Instant::now() + Duration::from_millis(at.saturating_sub(now)))
    }

    fn on_wake(&mut self) {
        let now = self.now();
        if let Some(change) = self.room.timer_expired(now) {
            self.after_change(change);
        }
        if self.room.expire_grace(now) {
            info!("reconnect grace expired");
            self.publish_state();
        }
        if self.bindings.is_empty() && self.idle_deadline_ms().is_some_and(|at| at <= now) {
            info!("room idle; closing");
            self.room.close();
        }
    }

    fn handle(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                name,
                player_id,
                conn_token,
                reply,
            } => self.join(name, player_id, conn_token, reply),
            RoomCommand::Disconnect {
                player_id,
                conn_token,
            } => self.disconnect(&player_id, conn_token),
            RoomCommand::PlaceBlock {
                player_id,
                row,
                col,
                block,
            } => match self.room.place_block(&player_id, row, col, block) {
                Ok(Placement::Team(deltas)) => {
                    for delta in deltas {
                        self.publish(RoomEvent::GridUpdate(delta));
                    }
                }
                Ok(Placement::Design(deltas)) => {
                    for delta in deltas {
                        self.publish(RoomEvent::DesignUpdate(delta));
                    }
                }
                Err(err) => debug!(%player_id, error = %err, "placement rejected"),
            },
            RoomCommand::Chat { player_id, text } => self.chat(&player_id, &text),
            RoomCommand::SetTheme { player_id, theme } => {
                match self.room.set_theme(&player_id, &theme) {
                    Ok(()) => self.publish_state(),
                    Err(err) => debug!(%player_id, error = %err, "theme change ignored"),
                }
            }
            RoomCommand::SetTeamName { player_id, name } => {
                match self.room.set_team_name(&player_id, &name) {
                    Ok(()) => self.publish_state(),
                    Err(err) => debug!(%player_id, error = %err, "team rename ignored"),
                }
            }
            RoomCommand::HostAction { player_id, action } => {
                let name = action.name();
                let now = self.now();
                match self.room.host_action(&player_id, action, now) {
                    Ok(change) => self.after_change(change),
                    Err(err @ StateError::NotHost) => {
                        warn!(%player_id, action = name, error = %err, "host action from non-host")
                    }
                    Err(err) => debug!(%player_id, action = name, error = %err, "host action ignored"),
                }
            }
            RoomCommand::AssistantChat { request, reply } => {
                let result = self.begin_assistant(request);
                let _ = reply.send(result);
            }
            RoomCommand::AssistantReply {
                team_id,
                request_id,
                request_text,
                result,
            } => self.finish_assistant(team_id, request_id, request_text, result),
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.room.snapshot());
            }
            RoomCommand::Shutdown => {
                info!("shutdown requested");
                self.room.close();
            }
        }
    }

    fn join(
        &mut self,
        name: String,
        requested_id: Option<String>,
        conn_token: u64,
        reply: oneshot::Sender<Result<JoinAccepted, JoinError>>,
    ) {
        if self.room.is_closed() {
            let _ = reply.send(Err(JoinError::RoomClosed));
            return;
        }
        if requested_id
            .as_ref()
            .is_some_and(|id| self.kicked.contains(id))
        {
            let _ = reply.send(Err(JoinError::Kicked));
            return;
        }

        let known = requested_id.filter(|id| self.room.player(id).is_some());
        let outcome = match known {
            Some(id) => match self.room.rejoin(&id) {
                Ok(outcome) => outcome,
                Err(_) => {
                    let _ = reply.send(Err(JoinError::RoomUnavailable));
                    return;
                }
            },
            None => self.room.join(Uuid::new_v4().to_string(), &name),
        };
        let player_id = outcome.player_id.clone();

        let (close_tx, close_rx) = oneshot::channel();
        let previous = self.bindings.insert(
            player_id.clone(),
            Binding {
                token: conn_token,
                close_tx,
            },
        );
        if let Some(previous) = previous {
            info!(%player_id, "connection replaced by newer session");
            let _ = previous.close_tx.send(CloseReason::Replaced);
        }
        self.idle_since_ms = None;

        let accepted = JoinAccepted {
            player_id: player_id.clone(),
            room_code: self.room.code().to_string(),
            rejoined: outcome.rejoined,
            close_rx,
        };
        if reply.send(Ok(accepted)).is_err() {
            // The socket went away mid-handshake; treat it like a drop.
            self.disconnect(&player_id, conn_token);
        } else {
            info!(%player_id, rejoined = outcome.rejoined, "player joined");
        }
        self.publish_state();
    }

    fn disconnect(&mut self, player_id: &str, conn_token: u64) {
        let owns_binding = self
            .bindings
            .get(player_id)
            .is_some_and(|binding| binding.token == conn_token);
        if !owns_binding {
            return;
        }
        self.bindings.remove(player_id);

        let now = self.now();
        self.room.disconnect(player_id, now);
        if self.bindings.is_empty() {
            self.idle_since_ms = Some(now);
        }
        info!(%player_id, "player disconnected; seat held");
    }

    fn chat(&mut self, player_id: &str, text: &str) {
        if self.room.is_closed() {
            return;
        }
        let Some(player) = self.room.player(player_id) else {
            debug!(%player_id, "chat from unknown player");
            return;
        };
        let cleaned: String = text
            .chars()
            .filter(|c| !c.is_control())
            .take(MAX_CHAT_CHARS)
            .collect();
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return;
        }
        let line = ChatLine {
            sender_id: player.id.clone(),
            sender_name: player.name.clone(),
            text: cleaned.to_string(),
            is_ai: false,
            team_id: player.team_id.clone(),
        };
        self.publish(RoomEvent::Chat(line));
    }

    fn after_change(&mut self, change: RoomChange) {
        match &change {
            RoomChange::PhaseChanged { from, to } => {
                info!(from = %from, to = %to, "phase changed");
                if *from == Phase::Round2 {
                    self.cancel_assistant_requests();
                }
            }
            RoomChange::Paused => info!("timer paused"),
            RoomChange::Resumed => info!("timer resumed"),
            RoomChange::Kicked { player_id } => {
                info!(%player_id, "player kicked");
                self.kicked.insert(player_id.clone());
                if let Some(binding) = self.bindings.remove(player_id) {
                    let _ = binding.close_tx.send(CloseReason::Kicked);
                }
            }
            RoomChange::Ended => info!("host ended the game"),
        }
        self.publish_state();
    }

    fn begin_assistant(&mut self, request: AssistantRequest) -> Result<u64, AssistantRejection> {
        let text = clean_request(&request.text).ok_or(AssistantRejection::EmptyText)?;
        self.room
            .check_assistant_request(&request.player_id, &request.team_id)
            .map_err(|err| match err {
                StateError::UnknownPlayer => AssistantRejection::UnknownPlayer,
                StateError::NotTeamMember => AssistantRejection::NotTeamMember,
                StateError::NotBuilder => AssistantRejection::NotBuilder,
                StateError::RoomClosed => AssistantRejection::RoomClosed,
                _ => AssistantRejection::WrongPhase,
            })?;
        if self.pending.contains_key(&request.team_id) {
            return Err(AssistantRejection::Busy);
        }

        let team = self
            .room
            .team(&request.team_id)
            .ok_or(AssistantRejection::NotTeamMember)?;
        let target = team.round_target.as_ref().or(request.target_hint.as_ref());
        let history = self.histories.entry(request.team_id.clone()).or_default();
        let messages = build_messages(target, &team.grid, history, &text);

        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let client = self.deps.assistant.clone();
        let limit = self.deps.assistant_timeout;
        let weak_tx = self.self_tx.clone();
        let team_id = request.team_id.clone();
        let request_text = text.clone();
        let task = tokio::spawn(async move {
            let result = match tokio::time::timeout(limit, client.complete(messages)).await {
                Ok(result) => result,
                Err(_) => Err(AiError::Timeout),
            };
            if let Some(tx) = weak_tx.upgrade() {
                let _ = tx
                    .send(RoomCommand::AssistantReply {
                        team_id,
                        request_id,
                        request_text,
                        result,
                    })
                    .await;
            }
        });
        self.pending.insert(
            request.team_id.clone(),
            PendingRequest {
                id: request_id,
                abort: task.abort_handle(),
            },
        );

        if let Some(player) = self.room.player(&request.player_id) {
            self.publish(RoomEvent::Chat(ChatLine {
                sender_id: player.id.clone(),
                sender_name: player.name.clone(),
                text,
                is_ai: false,
                team_id: request.team_id.clone(),
            }));
        }
        self.publish(RoomEvent::AiStatus {
            team_id: request.team_id.clone(),
            thinking: true,
        });
        info!(team_id = %request.team_id, request_id, "assistant request started");
        Ok(request_id)
    }

    fn finish_assistant(
        &mut self,
        team_id: String,
        request_id: u64,
        request_text: String,
        result: Result<String, AiError>,
    ) {
        let is_current = self
            .pending
            .get(&team_id)
            .is_some_and(|pending| pending.id == request_id);
        if !is_current {
            debug!(%team_id, request_id, "stale assistant reply dropped");
            return;
        }
        self.pending.remove(&team_id);

        if self.room.phase() == Phase::Round2 {
            match result {
                Ok(reply) => self.apply_assistant_reply(&team_id, request_id, request_text, reply),
                Err(err) => warn!(%team_id, request_id, error = %err, "assistant request failed"),
            }
        }
        self.publish(RoomEvent::AiStatus {
            team_id,
            thinking: false,
        });
    }

    fn apply_assistant_reply(
        &mut self,
        team_id: &str,
        request_id: u64,
        request_text: String,
        reply: String,
    ) {
        let Some(team) = self.room.team(team_id) else {
            return;
        };
        let parsed = parse_reply(&reply, ActionBounds::from(&team.grid));
        for rejected in &parsed.rejected {
            debug!(%team_id, request_id, ?rejected, "assistant action rejected");
        }

        let outcome = self.room.apply_assistant_actions(team_id, &parsed.actions);
        for (action, err) in &outcome.failed {
            debug!(%team_id, request_id, ?action, error = %err, "assistant action failed");
        }
        info!(
            %team_id,
            request_id,
            applied = outcome.applied.len(),
            rejected = parsed.rejected.len() + outcome.failed.len(),
            "assistant reply applied"
        );

        for delta in outcome.deltas {
            self.publish(RoomEvent::GridUpdate(delta));
        }
        if !outcome.applied.is_empty() {
            self.publish(RoomEvent::AiBuilding {
                team_id: team_id.to_string(),
                actions: outcome.applied,
            });
        }
        if !parsed.display_text.is_empty() {
            self.publish(RoomEvent::Chat(ChatLine {
                sender_id: ASSISTANT_SENDER_ID.to_string(),
                sender_name: ASSISTANT_SENDER_NAME.to_string(),
                text: parsed.display_text,
                is_ai: true,
                team_id: team_id.to_string(),
            }));
        }

        let history = self.histories.entry(team_id.to_string()).or_default();
        history.push(ChatTurn::new(ChatRole::User, request_text));
        history.push(ChatTurn::new(ChatRole::Assistant, reply));
    }

    fn cancel_assistant_requests(&mut self) {
        let pending: Vec<(String, PendingRequest)> = self.pending.drain().collect();
        for (team_id, request) in pending {
            request.abort.abort();
            debug!(%team_id, request_id = request.id, "assistant request cancelled");
            self.publish(RoomEvent::AiStatus {
                team_id,
                thinking: false,
            });
        }
    }

    fn shutdown(&mut self) {
        self.cancel_assistant_requests();
        for (_, binding) in self.bindings.drain() {
            let _ = binding.close_tx.send(CloseReason::RoomClosed);
        }
        self.publish(RoomEvent::Closed);
    }
}
