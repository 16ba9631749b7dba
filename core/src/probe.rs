use crate::auth::{bearer_header, TokenSource};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use tracing::{debug, error, warn};

pub const STATUS_PATH: &str = "/info";
pub const API_KEY_HEADER: &str = "x-api-key";

/// One-shot reachability check against the agent server's status endpoint.
#[derive(Clone, Default)]
pub struct LivenessProber {
    client: Client,
}

impl LivenessProber {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Returns `true` iff `GET {api_url}/info` answers with a 2xx status.
    ///
    /// Never fails: network errors, bad headers and non-success statuses are
    /// logged and reported as `false`.
    pub async fn probe(
        &self,
        api_url: &str,
        api_key: Option<&str>,
        tokens: &dyn TokenSource,
    ) -> bool {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.filter(|key| !key.is_empty()) {
            match HeaderValue::from_str(key) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(API_KEY_HEADER, value);
                }
                Err(err) => {
                    error!(%err, "api key is not a valid header value");
                    return false;
                }
            }
        }
        if let Some(bearer) = bearer_header(tokens).await {
            headers.insert(AUTHORIZATION, bearer);
        }

        let url = status_url(api_url);
        match self.client.get(&url).headers(headers).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(%url, status = %response.status(), "agent server is reachable");
                true
            }
            Ok(response) => {
                warn!(%url, status = %response.status(), "agent server status check failed");
                false
            }
            Err(err) => {
                error!(%url, %err, "agent server is unreachable");
                false
            }
        }
    }
}

fn status_url(api_url: &str) -> String {
    format!("{}{STATUS_PATH}", api_url.trim_end_matches('/'))
}
