use crate::domain::block::BlockType;
use crate::domain::errors::JoinError;
use crate::domain::room_code::RoomCode;
use crate::interface_adapters::http::error_response;
use crate::interface_adapters::protocol::{ClientMessage, ServerMessage, WelcomeDto};
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::ids::next_conn_token;
use crate::use_cases::{CloseReason, JoinAccepted, RoomCommand, RoomEvent, RoomHandle};

use axum::{
    Error,
    extract::{
        Query, State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::SinkExt;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{Instrument, debug, error, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    CommandsClosed,
    EventsClosed,
    JoinRequired,
    JoinTimeout,
    JoinRefused(JoinError),
    ClosedBeforeJoin,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct RoomQuery {
    // Room code the client wants to join; created on first use.
    #[serde(default)]
    room: Option<String>,
}

pub async fn room_event_serializer(
    mut events_rx: broadcast::Receiver<RoomEvent>,
    event_bytes_tx: broadcast::Sender<Utf8Bytes>,
    latest_state_tx: watch::Sender<Utf8Bytes>,
) {
    // Serialize each room event once and broadcast the shared bytes.
    loop {
        match events_rx.recv().await {
            // Connections announce closure themselves when their close signal fires.
            Ok(RoomEvent::Closed) => break,
            Ok(event) => {
                let is_state = matches!(event, RoomEvent::State(_));
                let msg = ServerMessage::from(event);
                let txt = match serde_json::to_string(&msg) {
                    Ok(txt) => txt,
                    Err(e) => {
                        error!(error = ?e, "failed to serialize room event");
                        continue;
                    }
                };

                let bytes = Utf8Bytes::from(txt);
                if is_state {
                    // Store the latest full state for lag recovery.
                    let _ = latest_state_tx.send(bytes.clone());
                }
                let _ = event_bytes_tx.send(bytes);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "room serializer lagged; skipping ahead");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("room events channel closed; serializer exiting");
                break;
            }
        }
    }
}

/// Spawns the serializer for a new room. Runs before the room actor starts.
pub fn spawn_room_serializer(room: &RoomHandle) {
    let span = info_span!("serializer", room_code = %room.code);
    tokio::spawn(
        room_event_serializer(
            room.events_tx.subscribe(),
            room.event_bytes_tx.clone(),
            room.latest_state_tx.clone(),
        )
        .instrument(span),
    );
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoomQuery>,
) -> Response {
    let Some(raw_code) = query.room else {
        return error_response(StatusCode::BAD_REQUEST, "room is required");
    };
    let code = match RoomCode::parse(&raw_code) {
        Ok(code) => code,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, err.to_string()),
    };

    let (room, created) = state.registry.get_or_create(code).await;
    if created {
        info!(room_code = %room.code, "room created by join");
    }
    ws.on_upgrade(move |socket| handle_socket(socket, room))
        .into_response()
}

async fn handle_socket(mut socket: WebSocket, room: RoomHandle) {
    // Separate connection id for correlating logs before/after a player_id exists.
    let conn_id = next_conn_token();
    let span = info_span!(
        "conn",
        conn_id,
        room_code = %room.code,
        player_id = tracing::field::Empty
    );

    async move {
        let mut ctx = match bootstrap_connection(&mut socket, &room, conn_id).await {
            Ok(ctx) => ctx,
            Err(NetError::ClosedBeforeJoin) => {
                info!("client disconnected before join handshake");
                return;
            }
            Err(NetError::JoinRefused(reason)) => {
                info!(reason = %reason, "join refused");
                return;
            }
            Err(e) => {
                warn!(error = ?e, "failed to bootstrap connection");
                return;
            }
        };

        tracing::Span::current().record("player_id", ctx.player_id.as_str());
        info!(rejoined = ctx.rejoined, "client connected");

        // Main Client Loop
        if let Err(e) = run_client_loop(&mut socket, &mut ctx).await {
            warn!(error = ?e, "client loop exited with error");
        }
    }
    .instrument(span)
    .await
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<usize, NetError> {
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    socket
        .send(Message::Text(txt.into()))
        .await
        .map_err(NetError::Ws)?;
    Ok(bytes)
}

struct ConnCtx {
    pub player_id: String,
    pub rejoined: bool,
    // Token the room uses to tell this socket apart from a newer one.
    pub conn_token: u64,
    pub commands: mpsc::Sender<RoomCommand>,
    pub event_bytes_rx: broadcast::Receiver<Utf8Bytes>,
    pub latest_state_rx: watch::Receiver<Utf8Bytes>,
    // Fires when the room replaces, kicks or closes this connection.
    pub close_rx: oneshot::Receiver<CloseReason>,
    // Count lag recovery snapshots sent to this client.
    pub lag_recovery_count: u64,

    pub msgs_in: u64,
    pub msgs_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,

    pub invalid_json: u32,

    pub last_command_full_log: Instant,
    pub last_event_lag_log: Instant,
    pub last_invalid_input_log: Instant,

    pub close_frame: Option<CloseFrame>,
}

#[derive(Debug)]
struct JoinHandshake {
    name: String,
    player_id: Option<String>,
    bytes_in: u64,
    msgs_in: u64,
}

async fn bootstrap_connection(
    socket: &mut WebSocket,
    room: &RoomHandle,
    conn_token: u64,
) -> Result<ConnCtx, NetError> {
    // Subscribe to updates *before* doing anything else (awaits) to not miss packets.
    let event_bytes_rx = room.event_bytes_tx.subscribe();
    let latest_state_rx = room.latest_state_tx.subscribe();

    let join = match timeout(JOIN_HANDSHAKE_TIMEOUT, read_join_handshake(socket)).await {
        Ok(result) => result?,
        Err(_) => {
            let _ = send_close_with_reason(socket, close_code::POLICY, "join timeout").await;
            return Err(NetError::JoinTimeout);
        }
    };

    let (reply, reply_rx) = oneshot::channel();
    let join_cmd = RoomCommand::Join {
        name: join.name,
        player_id: join.player_id,
        conn_token,
        reply,
    };
    if room.commands.send(join_cmd).await.is_err() {
        let _ = send_close_with_reason(socket, close_code::AWAY, "room closed").await;
        return Err(NetError::CommandsClosed);
    }
    let accepted: JoinAccepted = match reply_rx.await {
        Ok(Ok(accepted)) => accepted,
        Ok(Err(err)) => {
            let reason = match err {
                JoinError::RoomClosed => "room closed",
                JoinError::Kicked => "kicked by host",
                JoinError::RoomUnavailable => "room unavailable",
            };
            let _ = send_close_with_reason(socket, close_code::POLICY, reason).await;
            return Err(NetError::JoinRefused(err));
        }
        Err(_) => {
            let _ = send_close_with_reason(socket, close_code::AWAY, "room closed").await;
            return Err(NetError::CommandsClosed);
        }
    };

    // Tell the client "This is who you are".
    let welcome = ServerMessage::Welcome(WelcomeDto {
        player_id: accepted.player_id.clone(),
        room_code: accepted.room_code.clone(),
    });
    let mut greeting = vec![welcome];
    if accepted.rejoined {
        greeting.push(ServerMessage::Reconnected {});
    }

    let mut msgs_out = 0;
    let mut bytes_out = 0;
    for msg in &greeting {
        match send_message(socket, msg).await {
            Ok(bytes) => {
                msgs_out += 1;
                bytes_out += bytes as u64;
            }
            Err(err) => {
                // Release the seat binding if the handshake fails late.
                let _ = room
                    .commands
                    .send(RoomCommand::Disconnect {
                        player_id: accepted.player_id.clone(),
                        conn_token,
                    })
                    .await;
                return Err(err);
            }
        }
    }

    let now = Instant::now() - LOG_THROTTLE;
    Ok(ConnCtx {
        player_id: accepted.player_id,
        rejoined: accepted.rejoined,
        conn_token,
        commands: room.commands.clone(),
        event_bytes_rx,
        latest_state_rx,
        close_rx: accepted.close_rx,
        lag_recovery_count: 0,

        msgs_in: join.msgs_in,
        msgs_out,
        bytes_in: join.bytes_in,
        bytes_out,

        invalid_json: 0,

        last_command_full_log: now,
        last_event_lag_log: now,
        last_invalid_input_log: now,

        close_frame: None,
    })
}

enum LoopControl {
    Continue,
    Disconnect,
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_NAME_LEN: usize = 64;
const JOIN_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

async fn send_close_with_reason(
    socket: &mut WebSocket,
    code: u16,
    reason: &'static str,
) -> Result<(), NetError> {
    socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await
        .map_err(NetError::Ws)?;
    socket.close().await.map_err(NetError::Ws)
}

async fn read_join_handshake(socket: &mut WebSocket) -> Result<JoinHandshake, NetError> {
    // Unparseable frames are dropped; the handshake timeout still bounds the wait.
    let mut msgs_in = 0;
    let mut bytes_in = 0;
    loop {
        let Some(incoming) = socket.recv().await else {
            return Err(NetError::ClosedBeforeJoin);
        };

        let message = incoming.map_err(NetError::Ws)?;
        match message {
            Message::Text(text) => {
                msgs_in += 1;
                bytes_in += text.len() as u64;
                let payload = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Join(payload)) => payload,
                    Ok(_) => {
                        let _ = send_close_with_reason(socket, close_code::POLICY, "join required")
                            .await;
                        return Err(NetError::JoinRequired);
                    }
                    Err(err) => {
                        debug!(error = %err, "unparseable message before join dropped");
                        continue;
                    }
                };

                let name: String = payload.name.trim().chars().take(MAX_NAME_LEN).collect();
                let player_id = payload
                    .player_id
                    .map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty());

                return Ok(JoinHandshake {
                    name,
                    player_id,
                    bytes_in,
                    msgs_in,
                });
            }
            Message::Binary(bytes) => {
                msgs_in += 1;
                bytes_in += bytes.len() as u64;
                debug!("binary message before join dropped");
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return Err(NetError::ClosedBeforeJoin),
        }
    }
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

/// Maps a parsed client message to a room command. `None` means drop it.
fn to_room_command(
    player_id: &str,
    msg: ClientMessage,
    last_invalid_input_log: &mut Instant,
) -> Option<RoomCommand> {
    let player_id = player_id.to_string();
    match msg {
        ClientMessage::Join(_) => {
            // Ignore repeated Join packets after bootstrap to keep the session stable.
            if should_log(last_invalid_input_log) {
                warn!("duplicate join ignored");
            }
            None
        }
        ClientMessage::PlaceBlock(payload) => match payload.block.parse::<BlockType>() {
            Ok(block) => Some(RoomCommand::PlaceBlock {
                player_id,
                row: payload.row,
                col: payload.col,
                block,
            }),
            Err(err) => {
                if should_log(last_invalid_input_log) {
                    warn!(error = %err, "unknown block ignored");
                }
                None
            }
        },
        ClientMessage::Chat(payload) => Some(RoomCommand::Chat {
            player_id,
            text: payload.text,
        }),
        ClientMessage::SetTheme(payload) => Some(RoomCommand::SetTheme {
            player_id,
            theme: payload.theme,
        }),
        ClientMessage::SetTeamName(payload) => Some(RoomCommand::SetTeamName {
            player_id,
            name: payload.name,
        }),
        ClientMessage::HostAction(payload) => match payload.into_action() {
            Some(action) => Some(RoomCommand::HostAction { player_id, action }),
            None => {
                if should_log(last_invalid_input_log) {
                    warn!("kickPlayer without targetPlayerId ignored");
                }
                None
            }
        },
    }
}

fn forward_command(
    commands: &mpsc::Sender<RoomCommand>,
    cmd: RoomCommand,
    last_command_full_log: &mut Instant,
) -> Result<LoopControl, NetError> {
    match commands.try_send(cmd) {
        Ok(()) => Ok(LoopControl::Continue),
        Err(mpsc::error::TrySendError::Full(_cmd)) => {
            if should_log(last_command_full_log) {
                warn!("room command channel full; dropping message");
            }
            Ok(LoopControl::Continue)
        }
        Err(mpsc::error::TrySendError::Closed(_cmd)) => Err(NetError::CommandsClosed),
    }
}

async fn run_client_loop(socket: &mut WebSocket, ctx: &mut ConnCtx) -> Result<(), NetError> {
    // Split borrows so `tokio::select!` can hold them concurrently.
    let ConnCtx {
        player_id,
        conn_token,
        commands,
        event_bytes_rx,
        latest_state_rx,
        close_rx,
        lag_recovery_count,
        msgs_in,
        msgs_out,
        bytes_in,
        bytes_out,
        invalid_json,
        last_command_full_log,
        last_event_lag_log,
        last_invalid_input_log,
        close_frame,
        ..
    } = ctx;

    let mut fatal: Option<NetError> = None;

    loop {
        // disconnect becomes true on error
        let disconnect: bool = tokio::select! {
            // Incoming Message from Client
            incoming = socket.recv() => {
                match handle_incoming_ws(
                    incoming,
                    player_id,
                    commands,
                    msgs_in,
                    bytes_in,
                    invalid_json,
                    last_command_full_log,
                    last_invalid_input_log,
                ) {
                    Ok(LoopControl::Continue) => false,
                    Ok(LoopControl::Disconnect) => true,
                    Err(e) => {
                        fatal = Some(e);
                        true
                    }
                }
            }

            // Outgoing Room Event
            event_msg = event_bytes_rx.recv() => {
                match event_msg {
                    Ok(bytes) => match forward_event_bytes(bytes, socket, msgs_out, bytes_out).await {
                        LoopControl::Continue => false,
                        LoopControl::Disconnect => true,
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        if should_log(last_event_lag_log) {
                            warn!(missed = n, "room events lagged; sending full state");
                        }

                        // Resync strategy: send the latest full state.
                        let latest = latest_state_rx.borrow().clone();
                        if latest.is_empty() {
                            false
                        } else {
                            let bytes_len = latest.len();
                            *lag_recovery_count += 1;
                            let outcome =
                                forward_event_bytes(latest, socket, msgs_out, bytes_out).await;

                            if should_log(last_event_lag_log) {
                                debug!(
                                    bytes = bytes_len,
                                    count = *lag_recovery_count,
                                    "sent lag recovery state"
                                );
                            }

                            match outcome {
                                LoopControl::Continue => false,
                                LoopControl::Disconnect => true,
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        fatal = Some(NetError::EventsClosed);
                        true
                    }
                }
            }

            // The room wants this connection gone.
            reason = &mut *close_rx => {
                let reason = reason.unwrap_or(CloseReason::RoomClosed);
                if reason == CloseReason::RoomClosed {
                    if let Ok(bytes) = send_message(socket, &ServerMessage::RoomClosed {}).await {
                        *msgs_out += 1;
                        *bytes_out += bytes as u64;
                    }
                }
                let code = match reason {
                    CloseReason::RoomClosed => close_code::AWAY,
                    CloseReason::Replaced | CloseReason::Kicked => close_code::POLICY,
                };
                *close_frame = Some(CloseFrame {
                    code,
                    reason: reason.as_str().into(),
                });
                info!(reason = reason.as_str(), "connection closed by room");
                true
            }
        };

        if disconnect {
            if let Some(frame) = close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    disconnect_cleanup(
        player_id,
        commands,
        *conn_token,
        *msgs_in,
        *msgs_out,
        *bytes_in,
        *bytes_out,
        *invalid_json,
        *lag_recovery_count,
    )
    .await;

    if let Some(err) = fatal {
        Err(err)
    } else {
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_incoming_ws(
    incoming: Option<Result<Message, Error>>,
    player_id: &str,
    commands: &mpsc::Sender<RoomCommand>,
    msgs_in: &mut u64,
    bytes_in: &mut u64,
    invalid_json: &mut u32,
    last_command_full_log: &mut Instant,
    last_invalid_input_log: &mut Instant,
) -> Result<LoopControl, NetError> {
    match incoming {
        Some(Ok(msg)) => match msg {
            Message::Text(text) => {
                *msgs_in += 1;
                *bytes_in += text.len() as u64;

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => match to_room_command(player_id, msg, last_invalid_input_log) {
                        Some(cmd) => forward_command(commands, cmd, last_command_full_log),
                        None => Ok(LoopControl::Continue),
                    },
                    Err(parse_err) => {
                        // Dropped and counted; the connection stays open.
                        *invalid_json += 1;
                        if should_log(last_invalid_input_log) {
                            warn!(
                                bytes = text.len(),
                                invalid = *invalid_json,
                                error = %parse_err,
                                "failed to parse client message"
                            );
                        }
                        Ok(LoopControl::Continue)
                    }
                }
            }
            Message::Binary(bytes) => {
                *msgs_in += 1;
                *bytes_in += bytes.len() as u64;
                *invalid_json += 1;
                if should_log(last_invalid_input_log) {
                    warn!(bytes = bytes.len(), "binary message dropped");
                }
                Ok(LoopControl::Continue)
            }
            Message::Ping(_) | Message::Pong(_) => Ok(LoopControl::Continue),
            Message::Close(_) => Ok(LoopControl::Disconnect),
        },
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => {
            info!("websocket closed");
            Ok(LoopControl::Disconnect)
        }
    }
}

async fn forward_event_bytes(
    event_msg: Utf8Bytes,
    socket: &mut WebSocket,
    msgs_out: &mut u64,
    bytes_out: &mut u64,
) -> LoopControl {
    let bytes_len = event_msg.len();
    match socket
        .send(Message::Text(event_msg))
        .await
        .map_err(NetError::Ws)
    {
        Ok(()) => {
            *msgs_out += 1;
            *bytes_out += bytes_len as u64;
            LoopControl::Continue
        }
        Err(err) => {
            // Log unexpected send failures; disconnect will follow immediately.
            warn!(error = ?err, "failed to send room event");
            LoopControl::Disconnect
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn disconnect_cleanup(
    player_id: &str,
    commands: &mpsc::Sender<RoomCommand>,
    conn_token: u64,
    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,
    invalid_json: u32,
    lag_recovery_count: u64,
) {
    // The room ignores this if a newer connection already owns the seat.
    let sent = commands
        .send(RoomCommand::Disconnect {
            player_id: player_id.to_string(),
            conn_token,
        })
        .await;
    if sent.is_err() {
        debug!("room already gone during disconnect");
    }

    debug!(
        msgs_in,
        msgs_out,
        bytes_in,
        bytes_out,
        invalid_json,
        lag_recovery_count,
        "connection stats"
    );
    info!("client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::room::HostAction;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> ClientMessage {
        serde_json::from_value(value).expect("client message")
    }

    #[test]
    fn unknown_blocks_are_dropped() {
        let mut last = Instant::now() - LOG_THROTTLE;
        let msg = parse(json!({"type": "placeBlock", "data": {"row": 0, "col": 0, "block": "lava"}}));
        assert!(to_room_command("p1", msg, &mut last).is_none());
    }

    #[test]
    fn host_actions_become_commands() {
        let mut last = Instant::now() - LOG_THROTTLE;
        let msg = parse(json!({"type": "hostAction", "data": {"action": "startRound"}}));
        match to_room_command("p1", msg, &mut last) {
            Some(RoomCommand::HostAction { player_id, action }) => {
                assert_eq!(player_id, "p1");
                assert_eq!(action, HostAction::StartRound);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn malformed_messages_keep_the_connection_open() {
        let (tx, mut rx) = mpsc::channel(4);
        let (mut msgs_in, mut bytes_in, mut invalid_json) = (0, 0, 0);
        let mut last_full = Instant::now() - LOG_THROTTLE;
        let mut last_invalid = Instant::now() - LOG_THROTTLE;

        let mut frames: Vec<Message> = (0..20)
            .map(|_| Message::Text(Utf8Bytes::from("not json")))
            .collect();
        frames.push(Message::Binary(vec![1u8, 2, 3].into()));
        for frame in frames {
            let control = handle_incoming_ws(
                Some(Ok(frame)),
                "p1",
                &tx,
                &mut msgs_in,
                &mut bytes_in,
                &mut invalid_json,
                &mut last_full,
                &mut last_invalid,
            );
            assert!(matches!(control, Ok(LoopControl::Continue)));
        }
        assert_eq!(invalid_json, 21);
        assert_eq!(msgs_in, 21);

        // A valid message after the noise still reaches the room.
        let chat = Message::Text(Utf8Bytes::from(r#"{"type":"chat","data":{"text":"hi"}}"#));
        let control = handle_incoming_ws(
            Some(Ok(chat)),
            "p1",
            &tx,
            &mut msgs_in,
            &mut bytes_in,
            &mut invalid_json,
            &mut last_full,
            &mut last_invalid,
        );
        assert!(matches!(control, Ok(LoopControl::Continue)));
        assert!(matches!(rx.try_recv(), Ok(RoomCommand::Chat { .. })));
    }

    #[test]
    fn full_channel_drops_without_disconnecting() {
        let (tx, _rx) = mpsc::channel(1);
        let mut last = Instant::now() - LOG_THROTTLE;
        let chat = || RoomCommand::Chat {
            player_id: "p1".to_string(),
            text: "hi".to_string(),
        };
        assert!(matches!(
            forward_command(&tx, chat(), &mut last),
            Ok(LoopControl::Continue)
        ));
        assert!(matches!(
            forward_command(&tx, chat(), &mut last),
            Ok(LoopControl::Continue)
        ));
        drop(_rx);
        assert!(matches!(
            forward_command(&tx, chat(), &mut last),
            Err(NetError::CommandsClosed)
        ));
    }
}
