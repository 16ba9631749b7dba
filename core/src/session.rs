use crate::api_key::ApiKeyStore;
use crate::auth::{CredentialInjector, SharedTokenSource};
use crate::config::{resolve, EnvDefaults, SessionConfig};
use crate::events::{CallerOptions, EventDispatcher, StreamOptions, StreamTransport};
use crate::notify::{LogNotifier, Notification, NotificationSink};
use crate::probe::LivenessProber;
use crate::state::{ConversationHandle, SharedState};
use crate::thread::{HttpThreadDirectory, ThreadDirectory, ThreadReconciler, DEFAULT_SETTLE_DELAY};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Lifecycle of one session.
///
/// The stream is usable while `Probing`; the probe only decides whether the
/// session ends up `Ready` degraded or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unconfigured,
    Probing,
    Ready { degraded: bool },
}

pub struct SessionBuilder {
    shared: SharedState,
    tokens: SharedTokenSource,
    env: EnvDefaults,
    api_key_store: Option<ApiKeyStore>,
    client: Client,
    notifier: Arc<dyn NotificationSink>,
    directory: Option<Arc<dyn ThreadDirectory>>,
    settle_delay: Duration,
}

impl SessionBuilder {
    pub fn new(shared: SharedState, tokens: SharedTokenSource) -> Self {
        Self {
            shared,
            tokens,
            env: EnvDefaults::default(),
            api_key_store: None,
            client: Client::new(),
            notifier: Arc::new(LogNotifier),
            directory: None,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn env(mut self, env: EnvDefaults) -> Self {
        self.env = env;
        self
    }

    pub fn api_key_store(mut self, store: ApiKeyStore) -> Self {
        self.api_key_store = Some(store);
        self
    }

    pub fn http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Defaults to an [`HttpThreadDirectory`] against the resolved backend.
    pub fn thread_directory(mut self, directory: Arc<dyn ThreadDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Resolve configuration and wire the components. Nothing touches the
    /// network until [`Session::start`].
    pub fn build(self) -> Session {
        let stored_key = self
            .api_key_store
            .as_ref()
            .and_then(ApiKeyStore::load_or_warn);
        let config = resolve(&self.shared, &self.env, stored_key.as_deref());

        let injector = CredentialInjector::new(self.client.clone(), self.tokens);
        let directory = self.directory.unwrap_or_else(|| {
            Arc::new(HttpThreadDirectory::new(injector.clone(), &config))
        });
        let reconciler = ThreadReconciler::new(self.shared.clone(), directory)
            .with_settle_delay(self.settle_delay);
        let conversation = ConversationHandle::new();
        let (phase, _) = watch::channel(SessionPhase::Unconfigured);

        info!(
            api_url = %config.api_url,
            assistant_id = %config.assistant_id,
            api_key = config.api_key.is_some(),
            "session assembled"
        );

        Session {
            inner: Arc::new(SessionInner {
                config,
                shared: self.shared,
                conversation: conversation.clone(),
                injector,
                dispatcher: EventDispatcher::new(conversation, reconciler),
                prober: LivenessProber::new(self.client),
                notifier: self.notifier,
                phase,
            }),
        }
    }
}

/// One bound configuration plus its live state. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    shared: SharedState,
    conversation: ConversationHandle,
    injector: CredentialInjector,
    dispatcher: EventDispatcher,
    prober: LivenessProber,
    notifier: Arc<dyn NotificationSink>,
    phase: watch::Sender<SessionPhase>,
}

impl Session {
    pub fn builder(shared: SharedState, tokens: SharedTokenSource) -> SessionBuilder {
        SessionBuilder::new(shared, tokens)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn shared_state(&self) -> &SharedState {
        &self.inner.shared
    }

    pub fn conversation(&self) -> &ConversationHandle {
        &self.inner.conversation
    }

    pub fn thread_id(&self) -> Option<String> {
        self.inner.shared.thread_id()
    }

    pub fn caller_options(&self) -> CallerOptions {
        CallerOptions {
            fetch: self.inner.injector.clone(),
        }
    }

    pub fn stream_options(&self) -> StreamOptions {
        let config = &self.inner.config;
        StreamOptions {
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            assistant_id: config.assistant_id.clone(),
            thread_id: self.thread_id(),
            caller: self.caller_options(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        *self.inner.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.inner.phase.subscribe()
    }

    /// Attach the transport and launch the liveness probe.
    ///
    /// Only the first call has any effect. Must be called inside a tokio
    /// runtime; the spawned tasks are detached and end with the runtime.
    pub fn start(&self, transport: &dyn StreamTransport) {
        let claimed = self.inner.phase.send_if_modified(|phase| {
            if *phase == SessionPhase::Unconfigured {
                *phase = SessionPhase::Probing;
                true
            } else {
                false
            }
        });
        if !claimed {
            warn!("session already started");
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        transport.attach(self.stream_options(), tx);
        tokio::spawn(self.inner.dispatcher.clone().run(rx));

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let reachable = inner
                .prober
                .probe(
                    &inner.config.api_url,
                    inner.config.api_key.as_deref(),
                    inner.injector.token_source().as_ref(),
                )
                .await;
            if !reachable {
                inner
                    .notifier
                    .notify(Notification::connection_failed(&inner.config.api_url));
            }
            inner.phase.send_replace(SessionPhase::Ready {
                degraded: !reachable,
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::events::{StreamEvent, StreamEventSender};
    use crate::notify::{ChannelNotifier, Severity};
    use crate::thread::Thread;
    use crate::ui::{UiEvent, UiMessage};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct ScriptedTransport {
        script: Vec<StreamEvent>,
        seen: Mutex<Option<(Option<String>, String)>>,
    }

    impl StreamTransport for ScriptedTransport {
        fn attach(&self, options: StreamOptions, events: StreamEventSender) {
            *self.seen.lock() = Some((options.thread_id, options.assistant_id));
            for event in &self.script {
                events.send(event.clone()).expect("session pump alive");
            }
        }
    }

    struct NoThreads;

    #[async_trait]
    impl ThreadDirectory for NoThreads {
        async fn list(&self) -> anyhow::Result<Vec<Thread>> {
            Ok(Vec::new())
        }

        fn replace(&self, _threads: Vec<Thread>) {}
    }

    fn builder(api_url: String) -> SessionBuilder {
        let shared = SharedState::from_query(&format!("apiUrl={api_url}&threadId=t-1"));
        Session::builder(shared, Arc::new(StaticToken::new("T"))).thread_directory(Arc::new(NoThreads))
    }

    async fn wait_ready(session: &Session) -> SessionPhase {
        let mut rx = session.watch_phase();
        let phase = *rx
            .wait_for(|phase| matches!(phase, SessionPhase::Ready { .. }))
            .await
            .expect("phase sender alive");
        phase
    }

    #[tokio::test]
    async fn reachable_backend_becomes_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let (notifier, mut notices) = ChannelNotifier::new();
        let session = builder(server.uri()).notifier(Arc::new(notifier)).build();
        assert_eq!(session.phase(), SessionPhase::Unconfigured);

        let transport = ScriptedTransport::default();
        session.start(&transport);
        assert_eq!(
            wait_ready(&session).await,
            SessionPhase::Ready { degraded: false }
        );
        assert!(notices.try_recv().is_err());
        assert_eq!(
            transport.seen.lock().clone(),
            Some((Some("t-1".to_string()), "agent".to_string()))
        );
    }

    #[tokio::test]
    async fn failed_probe_notifies_once_and_degrades() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        let (notifier, mut notices) = ChannelNotifier::new();
        let session = builder(server.uri()).notifier(Arc::new(notifier)).build();

        let transport = ScriptedTransport::default();
        session.start(&transport);
        session.start(&transport);
        assert_eq!(
            wait_ready(&session).await,
            SessionPhase::Ready { degraded: true }
        );

        let notice = notices.recv().await.expect("notification");
        assert_eq!(notice.severity, Severity::Error);
        assert!(notice.description.contains(&server.uri()));
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn stream_is_usable_while_probing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;
        let session = builder(server.uri()).build();
        let transport = ScriptedTransport {
            script: vec![StreamEvent::Custom(UiEvent::Update(UiMessage::new(
                "u1",
                "status",
                json!({ "text": "searching" }),
            )))],
            ..Default::default()
        };
        session.start(&transport);

        tokio::time::timeout(Duration::from_secs(1), async {
            while session.conversation().ui().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("ui event applied");
        assert_eq!(session.phase(), SessionPhase::Probing);
        wait_ready(&session).await;
    }

    #[test]
    fn caller_options_carry_the_injector() {
        let session = builder("https://x".into()).build();
        let options = session.stream_options();
        assert_eq!(options.api_url, "https://x");
        assert!(Arc::ptr_eq(
            options.caller.fetch.token_source(),
            session.inner.injector.token_source()
        ));
    }
}
