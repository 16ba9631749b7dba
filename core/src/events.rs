use crate::auth::CredentialInjector;
use crate::state::{ConversationHandle, ValuesUpdate};
use crate::thread::ThreadReconciler;
use crate::ui::UiEvent;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

/// Events a streaming transport delivers to the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Full state snapshot from the server.
    Values(ValuesUpdate),
    /// Out-of-band UI record.
    Custom(UiEvent),
    /// Server assigned (or confirmed) the conversation id.
    ThreadId(String),
}

pub type StreamEventSender = UnboundedSender<StreamEvent>;
pub type StreamEventReceiver = UnboundedReceiver<StreamEvent>;

/// Options the transport uses for each HTTP call it makes.
#[derive(Clone)]
pub struct CallerOptions {
    pub fetch: CredentialInjector,
}

/// Everything a transport needs to open the stream for one session.
#[derive(Clone)]
pub struct StreamOptions {
    pub api_url: String,
    pub api_key: Option<String>,
    pub assistant_id: String,
    pub thread_id: Option<String>,
    pub caller: CallerOptions,
}

/// The external streaming client. It owns framing, retries and its own error
/// reporting; it only has to push decoded events into `events`.
pub trait StreamTransport: Send + Sync {
    fn attach(&self, options: StreamOptions, events: StreamEventSender);
}

/// Routes stream events to the conversation state and thread reconciler.
#[derive(Clone)]
pub struct EventDispatcher {
    conversation: ConversationHandle,
    reconciler: ThreadReconciler,
}

impl EventDispatcher {
    pub fn new(conversation: ConversationHandle, reconciler: ThreadReconciler) -> Self {
        Self {
            conversation,
            reconciler,
        }
    }

    pub fn dispatch(&self, event: StreamEvent) {
        match event {
            StreamEvent::Values(update) => {
                trace!(messages = update.messages.len(), "values snapshot");
                self.conversation.apply_values(update);
            }
            StreamEvent::Custom(ui_event) => {
                let ui = self.conversation.apply_ui_events(std::slice::from_ref(&ui_event));
                trace!(id = ui_event.id(), size = ui.len(), "merged ui event");
            }
            StreamEvent::ThreadId(id) => {
                self.reconciler.on_thread_assigned(&id);
            }
        }
    }

    /// Drain `events` until every sender is dropped.
    pub async fn run(self, mut events: StreamEventReceiver) {
        while let Some(event) = events.recv().await {
            self.dispatch(event);
        }
        debug!("stream event channel closed");
    }
}
