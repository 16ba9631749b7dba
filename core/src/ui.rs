//! Client-side projection of the server's out-of-band UI channel.
//!
//! The agent server pushes `ui` records to create or patch a component and
//! `remove-ui` tombstones to drop one. [`merge`] folds one record into the
//! current projection without touching the input slice.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiMessage {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub props: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl UiMessage {
    pub fn new(id: impl Into<String>, name: impl Into<String>, props: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            props,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// `metadata.merge == true` asks for a props patch instead of a replace.
    fn wants_prop_merge(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.get("merge"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveUiMessage {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UiEvent {
    #[serde(rename = "ui")]
    Update(UiMessage),
    #[serde(rename = "remove-ui")]
    Remove(RemoveUiMessage),
}

impl UiEvent {
    pub fn id(&self) -> &str {
        match self {
            Self::Update(message) => &message.id,
            Self::Remove(removal) => &removal.id,
        }
    }

    pub fn remove(id: impl Into<String>) -> Self {
        Self::Remove(RemoveUiMessage { id: id.into() })
    }
}

impl From<UiMessage> for UiEvent {
    fn from(message: UiMessage) -> Self {
        Self::Update(message)
    }
}

/// Fold one event into `current`, returning the new projection.
///
/// Updates append when the id is new and replace in place otherwise. Removals
/// of unknown ids are ignored.
pub fn merge(current: &[UiMessage], incoming: &UiEvent) -> Vec<UiMessage> {
    let mut next = current.to_vec();
    apply(&mut next, incoming);
    next
}

/// Fold a batch left to right. Later events for the same id win.
pub fn merge_all<'a, I>(current: &[UiMessage], events: I) -> Vec<UiMessage>
where
    I: IntoIterator<Item = &'a UiEvent>,
{
    let mut next = current.to_vec();
    for event in events {
        apply(&mut next, event);
    }
    next
}

fn apply(ui: &mut Vec<UiMessage>, event: &UiEvent) {
    match event {
        UiEvent::Remove(removal) => ui.retain(|existing| existing.id != removal.id),
        UiEvent::Update(message) => match ui.iter().position(|m| m.id == message.id) {
            Some(index) => {
                let mut replacement = message.clone();
                if message.wants_prop_merge() {
                    replacement.props = merge_props(&ui[index].props, &message.props);
                }
                ui[index] = replacement;
            }
            None => ui.push(message.clone()),
        },
    }
}

fn merge_props(previous: &Value, incoming: &Value) -> Value {
    match (previous, incoming) {
        (Value::Object(previous), Value::Object(incoming)) => {
            let mut merged: Map<String, Value> = previous.clone();
            for (key, value) in incoming {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => incoming.clone(),
    }
}
