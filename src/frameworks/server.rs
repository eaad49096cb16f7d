// Framework bootstrap for the build server runtime.

use crate::domain::ports::CompletionClient;
use crate::frameworks::config;
use crate::interface_adapters::clients::llm::{DisabledAssistant, LlmClient};
use crate::interface_adapters::net::{
    ai_chat_handler, create_room_handler, get_room_handler, spawn_room_serializer, ws_handler,
};
use crate::interface_adapters::state::{AppState, SystemClock};
use crate::use_cases::{RoomDeps, RoomRegistry, RoomSettings};

use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/rooms", post(create_room_handler))
        .route("/api/rooms/{code}", get(get_room_handler))
        .route("/api/ai/chat", post(ai_chat_handler))
        .with_state(state)
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let address = listener.local_addr()?;
    let state = build_state()?;
    let registry = Arc::clone(&state.registry);
    let app = router(state);

    tracing::info!(%address, "listening");

    // Serve app and report errors rather than panicking
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await
        .inspect_err(|e| {
            tracing::error!(error = %e, "server error");
        })
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

async fn shutdown_signal(registry: Arc<RoomRegistry>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown requested; closing rooms");
    // Rooms tell their sockets "roomClosed" before the listener stops.
    registry.close_all().await;
}

fn build_state() -> Result<Arc<AppState>> {
    let assistant_timeout = config::llm_timeout();
    let assistant: Arc<dyn CompletionClient> = match config::llm_api_url() {
        Some(url) => {
            let client = LlmClient::new(
                url.clone(),
                config::llm_api_key(),
                config::llm_model(),
                assistant_timeout,
            )
            .map_err(|e| std::io::Error::other(format!("failed to initialize llm client: {e}")))?;
            tracing::debug!(
                llm_api_url = %url,
                llm_timeout_ms = assistant_timeout.as_millis(),
                "assistant configured"
            );
            Arc::new(client)
        }
        None => {
            tracing::warn!("LLM_API_URL not set; assistant disabled");
            Arc::new(DisabledAssistant)
        }
    };

    // Owns the set of active room actors.
    let registry = Arc::new(RoomRegistry::new(RoomSettings {
        command_channel_capacity: config::ROOM_COMMAND_CHANNEL_CAPACITY,
        event_broadcast_capacity: config::ROOM_EVENT_BROADCAST_CAPACITY,
        default_options: config::default_room_options(),
        deps: RoomDeps {
            clock: Arc::new(SystemClock),
            assistant,
            assistant_timeout,
            idle_timeout: config::room_idle_timeout(),
        },
        on_spawn: spawn_room_serializer,
    }));

    Ok(Arc::new(AppState { registry }))
}
