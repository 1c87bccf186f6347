pub mod error;
pub mod types;

pub use error::{Result, SearchError};
pub use types::{Hit, Hits, SearchResponse, Total};

use std::time::Duration;

use serde::de::DeserializeOwned;

const CONTENT_TYPE_JSON: &str = "application/json; charset=UTF-8";

/// Client for a single `_search` endpoint (index or index pattern baked into the URL).
pub struct SearchClient {
    client: reqwest::Client,
    url: String,
    username: String,
    password: String,
}

impl SearchClient {
    /// Build a client for `url`, authenticating with HTTP basic auth.
    ///
    /// `accept_invalid_certs` disables TLS certificate validation. It exists for
    /// clusters running on self-signed certificates and is off unless asked for.
    pub fn new(
        url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self> {
        if accept_invalid_certs {
            tracing::warn!(url, "TLS certificate validation disabled for search backend");
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| SearchError::Build(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Run a query DSL body and decode the hits' `_source` documents as `T`.
    ///
    /// Sent as a GET with a JSON body, which is what `_search` expects.
    pub async fn search<T: DeserializeOwned>(
        &self,
        query: &serde_json::Value,
    ) -> Result<SearchResponse<T>> {
        let body = serde_json::to_vec(query)?;

        let resp = self
            .client
            .get(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_JSON)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = resp.bytes().await?;
        let parsed: SearchResponse<T> = serde_json::from_slice(&bytes)?;
        tracing::debug!(
            time_out = parsed.time_out,
            total = parsed.hits.total.value,
            returned = parsed.hits.hits.len(),
            "Search response decoded"
        );

        Ok(parsed)
    }
}
