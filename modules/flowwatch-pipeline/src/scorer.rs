use std::sync::Arc;

use tracing::{debug, info};

use flowwatch_common::{Batch, FlowwatchError, Result, ScoredBatch};
use scoring_client::{ScoringClient, ScoringError, EMPTY_PAYLOAD};

use crate::traits::FlowScorer;

/// Attaches one score per flow, in batch order.
pub struct Scorer {
    service: Arc<dyn FlowScorer>,
}

impl Scorer {
    pub fn new(service: Arc<dyn FlowScorer>) -> Self {
        Self { service }
    }

    /// Score every record in `batch`.
    ///
    /// An empty batch encodes to `[]` and is answered locally without a
    /// network call. A response whose length differs from the batch is a
    /// contract violation.
    pub async fn score(&self, batch: Batch) -> Result<ScoredBatch> {
        let payload = ScoringClient::encode(&batch.records()).map_err(encode_error)?;

        if payload == EMPTY_PAYLOAD {
            debug!("Nothing to score");
            return Ok(ScoredBatch::empty());
        }

        let scores = self.service.score(payload).await?;
        let scored = ScoredBatch::zip(batch, scores)?;
        info!(
            count = scored.len(),
            malicious = scored.malicious_count(),
            "Scored flows"
        );
        Ok(scored)
    }
}

/// A payload that cannot be built never reached the service; report it as
/// an encode failure, not a bad response.
fn encode_error(err: ScoringError) -> FlowwatchError {
    FlowwatchError::Encode {
        stage: "score",
        message: err.to_string(),
    }
}
