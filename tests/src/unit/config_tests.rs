use std::sync::Arc;
use tempfile::TempDir;
use threadline_core::config::{DEFAULT_API_URL, DEFAULT_ASSISTANT_ID};
use threadline_core::{
    use_session, ApiKeyStore, EnvDefaults, Session, SessionError, SessionProvider, SharedState,
    StaticToken,
};

fn env() -> EnvDefaults {
    EnvDefaults {
        api_url: Some("https://env.example.com".into()),
        assistant_id: Some("env-agent".into()),
        api_key: Some("env-key".into()),
    }
}

#[test]
fn route_fields_override_environment() {
    let shared = SharedState::from_query("apiUrl=https%3A%2F%2Fx&assistantId=foo");
    let session = Session::builder(shared, Arc::new(StaticToken::none()))
        .env(env())
        .build();
    assert_eq!(session.config().api_url, "https://x");
    assert_eq!(session.config().assistant_id, "foo");
    assert_eq!(session.config().api_key.as_deref(), Some("env-key"));
}

#[test]
fn nothing_configured_uses_fallbacks() {
    let session = Session::builder(SharedState::new(), Arc::new(StaticToken::none())).build();
    assert_eq!(session.config().api_url, DEFAULT_API_URL);
    assert_eq!(session.config().assistant_id, DEFAULT_ASSISTANT_ID);
    assert_eq!(session.config().api_key, None);
}

#[test]
fn stored_api_key_is_fixed_at_assembly() {
    let dir = TempDir::new().expect("temp dir");
    let store = ApiKeyStore::new(dir.path());
    store.save("stored-key").expect("save");

    let session = Session::builder(SharedState::new(), Arc::new(StaticToken::none()))
        .env(env())
        .api_key_store(store.clone())
        .build();
    store.save("rotated-key").expect("save");

    assert_eq!(session.config().api_key.as_deref(), Some("stored-key"));
    assert_eq!(session.stream_options().api_key.as_deref(), Some("stored-key"));
}

#[test]
fn access_point_requires_provider() {
    assert!(matches!(
        use_session(),
        Err(SessionError::OutsideProvider { .. })
    ));

    let session = Session::builder(SharedState::new(), Arc::new(StaticToken::none())).build();
    let provider = SessionProvider::new(session);
    assert!(provider.sync_scope(|| use_session().is_ok()));
}
