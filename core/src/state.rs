use crate::ui::{merge_all, UiEvent, UiMessage};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use url::form_urlencoded;

pub const THREAD_ID_KEY: &str = "threadId";
pub const API_URL_KEY: &str = "apiUrl";
pub const ASSISTANT_ID_KEY: &str = "assistantId";

/// Snapshot of the routing fields that survive reloads and deep links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteFields {
    pub thread_id: Option<String>,
    pub api_url: Option<String>,
    pub assistant_id: Option<String>,
}

/// Session-addressable state shared between components.
///
/// Cloning yields another handle to the same fields. Each field has a single
/// writer: `threadId` belongs to the thread reconciler, the others to whoever
/// restores the route (query string, CLI flags).
#[derive(Clone, Default)]
pub struct SharedState {
    inner: Arc<RwLock<RouteFields>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: RouteFields) -> Self {
        Self {
            inner: Arc::new(RwLock::new(fields)),
        }
    }

    /// Restore from a query string such as `threadId=abc&apiUrl=https%3A%2F%2Fx`.
    ///
    /// A leading `?` is accepted, unknown keys are ignored and empty values are
    /// treated as missing.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut fields = RouteFields::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            let value = Some(value.into_owned());
            match key.as_ref() {
                THREAD_ID_KEY => fields.thread_id = value,
                API_URL_KEY => fields.api_url = value,
                ASSISTANT_ID_KEY => fields.assistant_id = value,
                _ => {}
            }
        }
        Self::from_fields(fields)
    }

    /// Shareable form of the current fields; missing fields are omitted.
    pub fn to_query(&self) -> String {
        let fields = self.snapshot();
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in [
            (THREAD_ID_KEY, &fields.thread_id),
            (API_URL_KEY, &fields.api_url),
            (ASSISTANT_ID_KEY, &fields.assistant_id),
        ] {
            if let Some(value) = value {
                serializer.append_pair(key, value);
            }
        }
        serializer.finish()
    }

    pub fn snapshot(&self) -> RouteFields {
        self.inner.read().clone()
    }

    pub fn thread_id(&self) -> Option<String> {
        self.inner.read().thread_id.clone()
    }

    pub fn set_thread_id(&self, id: Option<String>) {
        self.inner.write().thread_id = id;
    }

    pub fn api_url(&self) -> Option<String> {
        self.inner.read().api_url.clone()
    }

    pub fn set_api_url(&self, url: Option<String>) {
        self.inner.write().api_url = url;
    }

    pub fn assistant_id(&self) -> Option<String> {
        self.inner.read().assistant_id.clone()
    }

    pub fn set_assistant_id(&self, id: Option<String>) {
        self.inner.write().assistant_id = id;
    }
}

/// Conversation message as delivered by the transport. Only `id`, `type` and
/// `content` are interpreted; everything else is carried through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn new(kind: impl Into<String>, content: impl Into<Value>) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            content: content.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub ui: Vec<UiMessage>,
}

/// Values snapshot pushed by the transport. `ui` is optional because most
/// snapshots only carry messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValuesUpdate {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<Vec<UiMessage>>,
}

/// Live conversation state owned by one session.
#[derive(Clone, Default)]
pub struct ConversationHandle {
    inner: Arc<RwLock<ConversationState>>,
}

impl ConversationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ConversationState {
        self.inner.read().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.read().messages.clone()
    }

    pub fn ui(&self) -> Vec<UiMessage> {
        self.inner.read().ui.clone()
    }

    /// Replace messages from a transport snapshot. A snapshot carrying `ui`
    /// rebuilds the projection through the merge engine, so repeated ids in
    /// the snapshot collapse to their last record.
    pub fn apply_values(&self, update: ValuesUpdate) {
        let ui = update.ui.map(|ui| {
            let events: Vec<UiEvent> = ui.into_iter().map(UiEvent::Update).collect();
            merge_all(&[], &events)
        });
        let mut state = self.inner.write();
        state.messages = update.messages;
        if let Some(ui) = ui {
            state.ui = ui;
        }
    }

    /// Fold custom events into the UI projection and return the new projection.
    pub fn apply_ui_events(&self, events: &[UiEvent]) -> Vec<UiMessage> {
        let mut state = self.inner.write();
        let next = merge_all(&state.ui, events);
        state.ui = next.clone();
        next
    }
}
