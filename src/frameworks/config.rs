use crate::domain::phase::PhaseToggles;
use crate::domain::room::{PhaseDurations, RoomOptions};
use crate::domain::roster::TeamBounds;
use std::{env, str::FromStr, time::Duration};

// Runtime/server constants and env-backed room defaults.

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key).as_deref().map(str::trim) {
        Ok("1") | Ok("true") | Ok("yes") | Ok("on") => true,
        Ok("0") | Ok("false") | Ok("no") | Ok("off") => false,
        _ => default,
    }
}

pub fn http_port() -> u16 {
    env_or("BUILD_SERVER_PORT", 3001)
}

/// Base URL of an OpenAI-compatible API. Unset disables the assistant.
pub fn llm_api_url() -> Option<String> {
    env::var("LLM_API_URL")
        .ok()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
}

pub fn llm_api_key() -> String {
    env::var("LLM_API_KEY").unwrap_or_default()
}

pub fn llm_model() -> String {
    env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string())
}

pub fn llm_timeout() -> Duration {
    Duration::from_millis(env_or("LLM_TIMEOUT_MS", 20_000))
}

pub fn room_idle_timeout() -> Duration {
    Duration::from_secs(env_or("ROOM_IDLE_SECONDS", 900))
}

/// Defaults for rooms created without explicit options.
pub fn default_room_options() -> RoomOptions {
    let interstitial_secs: u64 = env_or("INTERSTITIAL_SECONDS", 0);
    let defaults = TeamBounds::default();
    let min = env_or("MIN_TEAM_SIZE", defaults.min).max(2);
    let max = env_or("MAX_TEAM_SIZE", defaults.max).max(min);

    RoomOptions {
        toggles: PhaseToggles {
            design: env_flag("ROOM_DESIGN_PHASE", false),
            demo: env_flag("ROOM_DEMO_PHASE", false),
            timed_interstitial: interstitial_secs > 0,
        },
        bounds: TeamBounds { min, max },
        durations: PhaseDurations {
            design_ms: env_or::<u64>("DESIGN_SECONDS", 180).saturating_mul(1000),
            demo_ms: env_or::<u64>("DEMO_SECONDS", 60).saturating_mul(1000),
            round_ms: env_or::<u64>("ROUND_SECONDS", 300).saturating_mul(1000),
            interstitial_ms: interstitial_secs.saturating_mul(1000),
        },
        reconnect_grace_ms: env_or::<u64>("RECONNECT_GRACE_SECONDS", 30).saturating_mul(1000),
    }
}

pub const ROOM_COMMAND_CHANNEL_CAPACITY: usize = 256;
pub const ROOM_EVENT_BROADCAST_CAPACITY: usize = 128;
