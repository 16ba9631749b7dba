use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Request, RequestBuilder, Response};
use std::sync::Arc;
use tracing::{trace, warn};

/// Source of short-lived bearer tokens, usually backed by an identity provider.
///
/// Implementations own caching and refresh. The injector calls `token` once per
/// outbound request and never remembers the answer.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Option<String>;
}

pub type SharedTokenSource = Arc<dyn TokenSource>;

/// Token source that always yields the same value. Useful for service tokens
/// and for running without an identity provider (`StaticToken::none()`).
#[derive(Debug, Clone, Default)]
pub struct StaticToken {
    token: Option<String>,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn none() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Token source whose current value can be swapped at runtime, e.g. after the
/// identity provider reports a sign-in.
#[derive(Debug, Clone, Default)]
pub struct RotatingToken {
    current: Arc<Mutex<Option<String>>>,
}

impl RotatingToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: Option<String>) {
        *self.current.lock() = token;
    }
}

#[async_trait]
impl TokenSource for RotatingToken {
    async fn token(&self) -> Option<String> {
        self.current.lock().clone()
    }
}

/// Ask `source` for a token and encode it as a bearer header value.
///
/// Missing, empty and unencodable tokens all come back as `None`.
pub async fn bearer_header(source: &dyn TokenSource) -> Option<HeaderValue> {
    let token = source.token().await?;
    if token.is_empty() {
        return None;
    }
    match HeaderValue::from_str(&format!("Bearer {token}")) {
        Ok(mut value) => {
            value.set_sensitive(true);
            Some(value)
        }
        Err(err) => {
            warn!(%err, "token source returned a token that is not a valid header value");
            None
        }
    }
}

/// Wraps request execution so every call carries a fresh bearer token.
#[derive(Clone)]
pub struct CredentialInjector {
    client: Client,
    tokens: SharedTokenSource,
}

impl CredentialInjector {
    pub fn new(client: Client, tokens: SharedTokenSource) -> Self {
        Self { client, tokens }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn token_source(&self) -> &SharedTokenSource {
        &self.tokens
    }

    /// Attach `Authorization: Bearer <token>` if a token is available.
    ///
    /// Without a token the request is forwarded unchanged; the backend decides
    /// whether an anonymous call is acceptable.
    pub async fn authorize(&self, mut request: Request) -> Request {
        apply_bearer(request.headers_mut(), bearer_header(self.tokens.as_ref()).await);
        request
    }

    /// Authorize and send. Transport errors are returned untouched.
    pub async fn execute(&self, request: Request) -> reqwest::Result<Response> {
        let request = self.authorize(request).await;
        trace!(method = %request.method(), url = %request.url(), "sending authorized request");
        self.client.execute(request).await
    }

    pub async fn send(&self, builder: RequestBuilder) -> reqwest::Result<Response> {
        self.execute(builder.build()?).await
    }
}

fn apply_bearer(headers: &mut HeaderMap, bearer: Option<HeaderValue>) {
    if let Some(value) = bearer {
        headers.insert(AUTHORIZATION, value);
    }
}
