use log::{ debug, error, info };
use reqwest::Client as HttpClient;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{ endpoint, LlmError };
use crate::models::ollama::TagsResponse;

/// Upper bound for a whole `/api/tags` round trip.
pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// Lists the model names the server at `base_url` has installed. Uncached.
///
/// A server that accepts the connection but does not answer within `timeout` is a
/// [`LlmError::Network`] failure.
pub async fn fetch_models(
    http: &HttpClient,
    base_url: &str,
    timeout: Duration
) -> Result<Vec<String>, LlmError> {
    let url = endpoint(base_url, "/api/tags");
    let resp = http
        .get(&url)
        .timeout(timeout)
        .send().await
        .map_err(|source| LlmError::Network { url: url.clone(), source })?;

    if !resp.status().is_success() {
        return Err(LlmError::Http { url, status: resp.status() });
    }

    let body = resp.text().await.map_err(|source| LlmError::Network { url: url.clone(), source })?;
    let tags: TagsResponse = serde_json
        ::from_str(&body)
        .map_err(|source| LlmError::Decode { line: body.clone(), source })?;

    Ok(
        tags.models
            .into_iter()
            .map(|m| m.name)
            .collect()
    )
}

/// Per-server memo of the model list.
///
/// The first successful listing for a base URL is kept until [`ModelCache::invalidate`];
/// failures are reported and never stored, so the next call asks the server again.
pub struct ModelCache {
    http: HttpClient,
    timeout: Duration,
    entries: Mutex<HashMap<String, Vec<String>>>,
}

impl ModelCache {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            timeout: DEFAULT_LIST_TIMEOUT,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn fetch_or_get(&self, base_url: &str) -> Vec<String> {
        // held across the request so concurrent callers share one fetch
        let mut entries = self.entries.lock().await;
        if let Some(names) = entries.get(base_url) {
            debug!("Model list for {} served from cache", base_url);
            return names.clone();
        }

        match fetch_models(&self.http, base_url, self.timeout).await {
            Ok(names) => {
                info!("Fetched {} models from {}", names.len(), base_url);
                entries.insert(base_url.to_string(), names.clone());
                names
            }
            Err(e) => {
                error!("Failed to fetch models: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn invalidate(&self, base_url: &str) {
        if self.entries.lock().await.remove(base_url).is_some() {
            debug!("Invalidated cached model list for {}", base_url);
        }
    }
}
