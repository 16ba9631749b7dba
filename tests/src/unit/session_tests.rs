use parking_lot::Mutex;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use threadline_core::{
    ChannelNotifier, CredentialInjector, HttpThreadDirectory, Message, Session, SessionConfig,
    SessionPhase, SharedState, SharedTokenSource, StaticToken, StreamEvent, StreamEventSender,
    StreamOptions, StreamTransport, UiEvent, UiMessage, ValuesUpdate,
};
use tokio::runtime::Runtime;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime")
}

/// Keeps the sender so the test can push events after `start`.
#[derive(Default)]
struct HeldTransport {
    sender: Mutex<Option<StreamEventSender>>,
}

impl HeldTransport {
    fn emit(&self, event: StreamEvent) {
        self.sender
            .lock()
            .as_ref()
            .expect("transport attached")
            .send(event)
            .expect("session pump alive");
    }
}

impl StreamTransport for HeldTransport {
    fn attach(&self, options: StreamOptions, events: StreamEventSender) {
        assert_eq!(options.thread_id, None);
        *self.sender.lock() = Some(events);
    }
}

async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

#[test]
fn new_thread_is_persisted_and_listed() {
    let runtime = test_runtime();
    runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .and(header("authorization", "Bearer T"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/threads/search"))
            .and(header("authorization", "Bearer T"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{ "thread_id": "abc" }])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let shared = SharedState::from_query(&format!("apiUrl={}", server.uri()));
        let tokens: SharedTokenSource = Arc::new(StaticToken::new("T"));
        let directory = HttpThreadDirectory::new(
            CredentialInjector::new(Client::new(), tokens.clone()),
            &SessionConfig {
                api_url: server.uri(),
                assistant_id: "agent".into(),
                api_key: None,
            },
        );
        let (notifier, mut notices) = ChannelNotifier::new();
        let session = Session::builder(shared.clone(), tokens)
            .notifier(Arc::new(notifier))
            .thread_directory(Arc::new(directory.clone()))
            .settle_delay(Duration::from_millis(100))
            .build();
        let transport = HeldTransport::default();
        session.start(&transport);

        transport.emit(StreamEvent::ThreadId("abc".into()));
        transport.emit(StreamEvent::ThreadId("abc".into()));
        transport.emit(StreamEvent::Values(ValuesUpdate {
            messages: vec![Message::new("human", "papers on diffusion models")],
            ui: None,
        }));
        transport.emit(StreamEvent::Custom(UiEvent::Update(UiMessage::new(
            "plan",
            "search_plan",
            json!({ "steps": 3 }),
        ))));
        transport.emit(StreamEvent::Custom(UiEvent::Update(UiMessage::new(
            "plan",
            "search_plan",
            json!({ "steps": 4 }),
        ))));

        eventually("thread id", || shared.thread_id().as_deref() == Some("abc")).await;
        assert!(shared.to_query().contains("threadId=abc"));

        eventually("thread list refresh", || {
            directory.threads().iter().any(|thread| thread.thread_id == "abc")
        })
        .await;

        eventually("ready", || matches!(session.phase(), SessionPhase::Ready { .. })).await;
        assert_eq!(session.phase(), SessionPhase::Ready { degraded: false });
        assert!(notices.try_recv().is_err());

        let state = session.conversation().snapshot();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.ui.len(), 1);
        assert_eq!(state.ui[0].props, json!({ "steps": 4 }));

        let searches = server
            .received_requests()
            .await
            .expect("recording")
            .into_iter()
            .filter(|request| request.url.path() == "/threads/search")
            .count();
        assert_eq!(searches, 1);
    });
}

#[test]
fn unreachable_backend_degrades_without_blocking_events() {
    let runtime = test_runtime();
    runtime.block_on(async {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let api_url = format!("http://{}", listener.local_addr().expect("addr"));
        drop(listener);

        let (notifier, mut notices) = ChannelNotifier::new();
        let session = Session::builder(
            SharedState::from_query(&format!("apiUrl={api_url}")),
            Arc::new(StaticToken::none()),
        )
        .notifier(Arc::new(notifier))
        .build();
        let transport = HeldTransport::default();
        session.start(&transport);
        transport.emit(StreamEvent::Custom(UiEvent::Update(UiMessage::new(
            "a",
            "card",
            json!({}),
        ))));

        let notice = tokio::time::timeout(Duration::from_secs(5), notices.recv())
            .await
            .expect("notification in time")
            .expect("notification");
        assert!(notice.description.contains(&api_url));
        assert!(notice.dismissible);

        eventually("degraded", || {
            session.phase() == SessionPhase::Ready { degraded: true }
        })
        .await;
        eventually("ui applied", || session.conversation().ui().len() == 1).await;
    });
}
