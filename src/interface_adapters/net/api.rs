use crate::domain::room_code::RoomCode;
use crate::interface_adapters::http::error_response;
use crate::interface_adapters::protocol::{
    AiChatAccepted, AiChatRequest, CreateRoomRequest, CreateRoomResponse, RoomStateDto,
    grid_from_dto,
};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{AssistantRejection, AssistantRequest, RegistryError, RoomCommand};

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// `POST /api/rooms`: the body is optional; an empty body uses the server defaults.
pub async fn create_room_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        CreateRoomRequest::default()
    } else {
        match serde_json::from_slice::<CreateRoomRequest>(&body) {
            Ok(request) => request,
            Err(err) => {
                return error_response(StatusCode::BAD_REQUEST, format!("invalid payload: {err}"));
            }
        }
    };

    let options = match request.options {
        Some(overrides) => match overrides.apply(state.registry.default_options()) {
            Some(options) => Some(options),
            None => return error_response(StatusCode::BAD_REQUEST, "invalid team size bounds"),
        },
        None => None,
    };

    match state.registry.create_room(options).await {
        Ok(room) => {
            info!(room_code = %room.code, "room created over http");
            (
                StatusCode::CREATED,
                Json(CreateRoomResponse {
                    room_code: room.code.to_string(),
                }),
            )
                .into_response()
        }
        Err(err @ RegistryError::CodesExhausted) => {
            warn!(error = %err, "room creation failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        Err(err @ RegistryError::AlreadyExists) => {
            error_response(StatusCode::CONFLICT, err.to_string())
        }
    }
}

/// `GET /api/rooms/{code}`: full state for clients that need to resync.
pub async fn get_room_handler(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Response {
    let Ok(code) = RoomCode::parse(&code) else {
        return error_response(StatusCode::NOT_FOUND, "room not found");
    };
    let Some(room) = state.registry.get_room(&code).await else {
        return error_response(StatusCode::NOT_FOUND, "room not found");
    };

    let (reply, reply_rx) = oneshot::channel();
    if room.commands.send(RoomCommand::Snapshot { reply }).await.is_err() {
        return error_response(StatusCode::NOT_FOUND, "room not found");
    }
    match reply_rx.await {
        Ok(snapshot) => (StatusCode::OK, Json(RoomStateDto::from(&snapshot))).into_response(),
        Err(_) => error_response(StatusCode::NOT_FOUND, "room not found"),
    }
}

/// `POST /api/ai/chat`: queues an assistant request; the result arrives over the socket.
pub async fn ai_chat_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AiChatRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("invalid payload: {}", rejection.body_text()),
            );
        }
    };

    let Ok(code) = RoomCode::parse(&payload.room_code) else {
        return error_response(StatusCode::NOT_FOUND, "room not found");
    };
    let Some(room) = state.registry.get_room(&code).await else {
        return error_response(StatusCode::NOT_FOUND, "room not found");
    };

    let target_hint = match payload.target_grid.as_ref().map(grid_from_dto).transpose() {
        Ok(grid) => grid,
        Err(err) => {
            return error_response(StatusCode::BAD_REQUEST, format!("invalid targetGrid: {err}"));
        }
    };

    let request = AssistantRequest {
        player_id: payload.player_id,
        team_id: payload.team_id,
        text: payload.text,
        target_hint,
    };
    let (reply, reply_rx) = oneshot::channel();
    if room
        .commands
        .send(RoomCommand::AssistantChat { request, reply })
        .await
        .is_err()
    {
        return error_response(StatusCode::NOT_FOUND, "room not found");
    }

    match reply_rx.await {
        Ok(Ok(request_id)) => {
            (StatusCode::ACCEPTED, Json(AiChatAccepted { request_id })).into_response()
        }
        Ok(Err(rejection)) => error_response(rejection_status(rejection), rejection.as_str()),
        Err(_) => error_response(StatusCode::NOT_FOUND, "room not found"),
    }
}

fn rejection_status(rejection: AssistantRejection) -> StatusCode {
    match rejection {
        AssistantRejection::UnknownPlayer
        | AssistantRejection::NotTeamMember
        | AssistantRejection::NotBuilder
        | AssistantRejection::EmptyText => StatusCode::BAD_REQUEST,
        AssistantRejection::WrongPhase
        | AssistantRejection::Busy
        | AssistantRejection::RoomClosed => StatusCode::CONFLICT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_and_wrong_phase_conflict() {
        assert_eq!(rejection_status(AssistantRejection::Busy), StatusCode::CONFLICT);
        assert_eq!(
            rejection_status(AssistantRejection::WrongPhase),
            StatusCode::CONFLICT
        );
        assert_eq!(
            rejection_status(AssistantRejection::NotTeamMember),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            rejection_status(AssistantRejection::NotBuilder),
            StatusCode::BAD_REQUEST
        );
    }
}
