// Trait seams for the two remote collaborators.
//
// FlowSource — the search backend, queried once per run.
// FlowScorer — the scoring service, called at most once per run.
//
// Production impls wrap the HTTP clients and fold their errors into the
// run-level taxonomy. Tests use the mocks in `testing`.

use async_trait::async_trait;

use flowwatch_common::{FlowDocument, FlowwatchError, Result};
use scoring_client::{ScoringClient, ScoringError};
use search_client::{SearchClient, SearchError, SearchResponse};

#[async_trait]
pub trait FlowSource: Send + Sync {
    /// Run a query DSL body and return decoded flow documents.
    async fn search(&self, query: &serde_json::Value) -> Result<SearchResponse<FlowDocument>>;
}

#[async_trait]
pub trait FlowScorer: Send + Sync {
    /// Score a JSON-encoded array of flow records; one score per element.
    async fn score(&self, payload: String) -> Result<Vec<f32>>;
}

#[async_trait]
impl FlowSource for SearchClient {
    async fn search(&self, query: &serde_json::Value) -> Result<SearchResponse<FlowDocument>> {
        SearchClient::search::<FlowDocument>(self, query)
            .await
            .map_err(search_error)
    }
}

#[async_trait]
impl FlowScorer for ScoringClient {
    async fn score(&self, payload: String) -> Result<Vec<f32>> {
        self.predict(payload).await.map_err(scoring_error)
    }
}

const EXTRACT: &str = "extract";
const SCORE: &str = "score";

fn search_error(err: SearchError) -> FlowwatchError {
    match err {
        SearchError::Parse(message) => FlowwatchError::Decode {
            stage: EXTRACT,
            message,
        },
        other => FlowwatchError::Transport {
            stage: EXTRACT,
            message: other.to_string(),
        },
    }
}

fn scoring_error(err: ScoringError) -> FlowwatchError {
    match err {
        ScoringError::Parse(message) => FlowwatchError::Decode {
            stage: SCORE,
            message,
        },
        ScoringError::Encode(message) => FlowwatchError::Encode {
            stage: SCORE,
            message,
        },
        other => FlowwatchError::Transport {
            stage: SCORE,
            message: other.to_string(),
        },
    }
}
