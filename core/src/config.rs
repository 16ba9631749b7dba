use crate::state::SharedState;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "http://localhost:2024";
pub const DEFAULT_ASSISTANT_ID: &str = "agent";

pub const API_URL_ENV: &str = "THREADLINE_API_URL";
pub const ASSISTANT_ID_ENV: &str = "THREADLINE_ASSISTANT_ID";
pub const API_KEY_ENV: &str = "THREADLINE_API_KEY";

/// Fully resolved configuration of one session. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub api_url: String,
    pub assistant_id: String,
    pub api_key: Option<String>,
}

/// Build-time or environment defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvDefaults {
    pub api_url: Option<String>,
    pub assistant_id: Option<String>,
    pub api_key: Option<String>,
}

impl EnvDefaults {
    /// Read defaults from the process environment, loading `.env` first if
    /// one is present.
    pub fn from_environment() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded environment file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            api_url: lookup(API_URL_ENV),
            assistant_id: lookup(ASSISTANT_ID_ENV),
            api_key: lookup(API_KEY_ENV),
        }
    }
}

/// Resolve a session configuration from its layered sources.
///
/// URL and assistant: shared state, then environment, then the local
/// development fallbacks. API key: the persisted key, then environment, else
/// none. Blank values never win.
pub fn resolve(shared: &SharedState, env: &EnvDefaults, stored_api_key: Option<&str>) -> SessionConfig {
    let route = shared.snapshot();
    let api_url = first_present([route.api_url.as_deref(), env.api_url.as_deref()])
        .unwrap_or(DEFAULT_API_URL);
    let assistant_id = first_present([route.assistant_id.as_deref(), env.assistant_id.as_deref()])
        .unwrap_or(DEFAULT_ASSISTANT_ID);
    let api_key = first_present([stored_api_key, env.api_key.as_deref()]);

    SessionConfig {
        api_url: api_url.trim_end_matches('/').to_string(),
        assistant_id: assistant_id.to_string(),
        api_key: api_key.map(str::to_string),
    }
}

fn first_present<const N: usize>(candidates: [Option<&str>; N]) -> Option<&str> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
}
