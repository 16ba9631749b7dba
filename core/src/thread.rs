use crate::auth::CredentialInjector;
use crate::config::SessionConfig;
use crate::probe::API_KEY_HEADER;
use crate::state::SharedState;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Time given to the backend to list a freshly created thread.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(4);

const SEARCH_LIMIT: usize = 100;

/// Server-tracked conversation as returned by thread search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub thread_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub values: Value,
}

impl Thread {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            created_at: None,
            updated_at: None,
            metadata: Value::Null,
            status: None,
            values: Value::Null,
        }
    }
}

/// Thread-list cache shared with the rest of the application.
#[async_trait]
pub trait ThreadDirectory: Send + Sync {
    async fn list(&self) -> Result<Vec<Thread>>;

    /// Replace the cached list wholesale.
    fn replace(&self, threads: Vec<Thread>);
}

/// Thread directory backed by the agent server's search endpoint.
#[derive(Clone)]
pub struct HttpThreadDirectory {
    injector: CredentialInjector,
    api_url: String,
    assistant_id: String,
    api_key: Option<String>,
    cache: Arc<RwLock<Vec<Thread>>>,
}

impl HttpThreadDirectory {
    pub fn new(injector: CredentialInjector, config: &SessionConfig) -> Self {
        Self {
            injector,
            api_url: config.api_url.clone(),
            assistant_id: config.assistant_id.clone(),
            api_key: config.api_key.clone(),
            cache: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn threads(&self) -> Vec<Thread> {
        self.cache.read().clone()
    }

    /// Assistants addressed by UUID are matched by `assistant_id`, graph names
    /// by `graph_id`.
    fn search_body(&self) -> Value {
        let key = if Uuid::parse_str(&self.assistant_id).is_ok() {
            "assistant_id"
        } else {
            "graph_id"
        };
        let mut metadata = Map::new();
        metadata.insert(key.to_string(), Value::String(self.assistant_id.clone()));
        json!({
            "metadata": metadata,
            "limit": SEARCH_LIMIT,
        })
    }
}

#[async_trait]
impl ThreadDirectory for HttpThreadDirectory {
    async fn list(&self) -> Result<Vec<Thread>> {
        let url = format!("{}/threads/search", self.api_url);
        let mut request = self.injector.client().post(&url).json(&self.search_body());
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        let response = self
            .injector
            .send(request)
            .await
            .with_context(|| format!("thread search request to {url} failed"))?
            .error_for_status()
            .context("thread search rejected")?;
        let threads = response
            .json::<Vec<Thread>>()
            .await
            .context("thread search returned an unexpected body")?;
        debug!(count = threads.len(), "fetched thread list");
        Ok(threads)
    }

    fn replace(&self, threads: Vec<Thread>) {
        *self.cache.write() = threads;
    }
}

/// Captures the server-assigned thread id and makes it visible elsewhere.
#[derive(Clone)]
pub struct ThreadReconciler {
    shared: SharedState,
    directory: Arc<dyn ThreadDirectory>,
    settle_delay: Duration,
    last_seen: Arc<Mutex<Option<String>>>,
}

impl ThreadReconciler {
    /// A thread id already present in `shared` (restored from a link) counts as
    /// observed, so the transport re-announcing it does nothing.
    pub fn new(shared: SharedState, directory: Arc<dyn ThreadDirectory>) -> Self {
        let last_seen = shared.thread_id();
        Self {
            shared,
            directory,
            settle_delay: DEFAULT_SETTLE_DELAY,
            last_seen: Arc::new(Mutex::new(last_seen)),
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Persist a newly observed thread id and schedule a thread-list refresh.
    ///
    /// Repeats of the last observed id return `None`, but still restore
    /// `threadId` if navigation cleared it meanwhile. A different id is handled
    /// like a first observation. Must be called inside a tokio runtime.
    pub fn on_thread_assigned(&self, id: &str) -> Option<JoinHandle<()>> {
        {
            let mut last_seen = self.last_seen.lock();
            if last_seen.as_deref() == Some(id) {
                if self.shared.thread_id().as_deref() != Some(id) {
                    debug!(thread_id = id, "restoring cleared thread id");
                    self.shared.set_thread_id(Some(id.to_string()));
                }
                return None;
            }
            *last_seen = Some(id.to_string());
        }

        self.shared.set_thread_id(Some(id.to_string()));
        info!(thread_id = id, "thread assigned");

        let directory = self.directory.clone();
        let delay = self.settle_delay;
        Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            refresh_threads(directory.as_ref()).await;
        }))
    }
}

/// Reload the thread list into the cache. Failures are logged and dropped;
/// a stale list is fixed by the next manual refresh.
pub async fn refresh_threads(directory: &dyn ThreadDirectory) {
    match directory.list().await {
        Ok(threads) => directory.replace(threads),
        Err(err) => warn!(error = ?err, "failed to refresh thread list"),
    }
}
