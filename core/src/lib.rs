pub mod api_key;
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod notify;
pub mod probe;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod thread;
pub mod ui;

pub use api_key::ApiKeyStore;
pub use auth::{CredentialInjector, RotatingToken, SharedTokenSource, StaticToken, TokenSource};
pub use config::{EnvDefaults, SessionConfig};
pub use context::{use_session, SessionProvider};
pub use error::{ApiKeyStoreError, SessionError};
pub use events::{CallerOptions, StreamEvent, StreamEventSender, StreamOptions, StreamTransport};
pub use notify::{ChannelNotifier, LogNotifier, Notification, NotificationSink, Severity};
pub use probe::LivenessProber;
pub use session::{Session, SessionBuilder, SessionPhase};
pub use state::{ConversationState, Message, SharedState, ValuesUpdate};
pub use thread::{HttpThreadDirectory, Thread, ThreadDirectory, ThreadReconciler};
pub use ui::{merge, merge_all, RemoveUiMessage, UiEvent, UiMessage};
