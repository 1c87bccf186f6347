pub mod error;

pub use error::{Result, ScoringError};

use std::time::Duration;

use serde::Serialize;

const CONTENT_TYPE_JSON: &str = "application/json; charset=UTF-8";

/// JSON encoding of an empty batch. Payloads equal to this are never sent.
pub const EMPTY_PAYLOAD: &str = "[]";

pub struct ScoringClient {
    client: reqwest::Client,
    url: String,
}

impl ScoringClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScoringError::Build(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Serialize `items` into the request payload the predict endpoint expects.
    pub fn encode<T: Serialize>(items: &[T]) -> Result<String> {
        serde_json::to_string(items).map_err(|e| ScoringError::Encode(e.to_string()))
    }

    /// POST a pre-encoded JSON array and decode one score per element.
    ///
    /// The response length is not checked here; correlating scores back to
    /// inputs is the caller's job.
    pub async fn predict(&self, payload: String) -> Result<Vec<f32>> {
        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_JSON)
            .body(payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ScoringError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = resp.bytes().await?;
        let scores: Vec<f32> = serde_json::from_slice(&bytes)?;
        tracing::debug!(count = scores.len(), "Scores decoded");
        Ok(scores)
    }
}
