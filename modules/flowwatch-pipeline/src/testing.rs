// Test mocks for the pipeline.
//
// Two mocks matching the two remote trait boundaries:
// - MockSource (FlowSource) — queued responses, records every query
// - MockScorer (FlowScorer) — queued score vectors, records every payload
//
// Plus helpers for building search responses from JSON the way the backend
// would send them. The cursor fake is `cursor::MemoryCursorStore`.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use flowwatch_common::{FlowDocument, FlowwatchError, Result};
use search_client::SearchResponse;

use crate::traits::{FlowScorer, FlowSource};

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// Returns queued responses in order. Errors once the queue is drained.
#[derive(Default)]
pub struct MockSource {
    responses: Mutex<VecDeque<Result<SearchResponse<FlowDocument>>>>,
    queries: Mutex<Vec<Value>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, response: SearchResponse<FlowDocument>) -> Self {
        self.lock_responses().push_back(Ok(response));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.lock_responses().push_back(Err(FlowwatchError::Transport {
            stage: "extract",
            message: message.to_string(),
        }));
        self
    }

    /// Every query received, oldest first.
    pub fn queries(&self) -> Vec<Value> {
        self.queries.lock().unwrap().clone()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<SearchResponse<FlowDocument>>>> {
        self.responses.lock().unwrap()
    }
}

#[async_trait]
impl FlowSource for MockSource {
    async fn search(&self, query: &Value) -> Result<SearchResponse<FlowDocument>> {
        self.queries.lock().unwrap().push(query.clone());
        self.lock_responses().pop_front().unwrap_or_else(|| {
            Err(FlowwatchError::Transport {
                stage: "extract",
                message: "MockSource: no response queued".to_string(),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// MockScorer
// ---------------------------------------------------------------------------

/// Returns queued score vectors in order. Errors once the queue is drained.
#[derive(Default)]
pub struct MockScorer {
    responses: Mutex<VecDeque<Result<Vec<f32>>>>,
    payloads: Mutex<Vec<String>>,
}

impl MockScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, scores: Vec<f32>) -> Self {
        self.responses.lock().unwrap().push_back(Ok(scores));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(FlowwatchError::Transport {
                stage: "score",
                message: message.to_string(),
            }));
        self
    }

    pub fn call_count(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }

    pub fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl FlowScorer for MockScorer {
    async fn score(&self, payload: String) -> Result<Vec<f32>> {
        self.payloads.lock().unwrap().push(payload);
        self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(FlowwatchError::Transport {
                stage: "score",
                message: "MockScorer: no response queued".to_string(),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Response builders
// ---------------------------------------------------------------------------

/// A `_source` document as the backend returns it.
pub fn flow_doc(timestamp: &str, src: &str, dst: &str, dport: u16) -> Value {
    json!({
        "@timestamp": timestamp,
        "netflow": {
            "source_ipv4_address": src,
            "destination_ipv4_address": dst,
            "source_ipv4_prefix_length": 24,
            "destination_ipv4_prefix_length": 0,
            "source_transport_port": 40000,
            "destination_transport_port": dport,
            "protocol_identifier": 6,
            "packet_delta_count": 3,
            "octet_delta_count": 180,
            "tcp_control_bits": 2,
            "flow_duration_milliseconds": 5,
            "post_packet_delta_count": 0,
            "post_octet_delta_count": 0,
            "ixia_l7_app_id": 0,
            "exporter": { "address": "192.168.0.254:2055", "timestamp": timestamp }
        }
    })
}

/// Decode a full response body built from `docs`.
pub fn hits_response(docs: Vec<Value>) -> SearchResponse<FlowDocument> {
    let total = docs.len();
    let hits: Vec<Value> = docs.into_iter().map(|d| json!({ "_source": d })).collect();
    serde_json::from_value(json!({
        "time_out": false,
        "hits": { "total": { "value": total }, "hits": hits }
    }))
    .expect("test response should decode")
}

pub fn timed_out_response() -> SearchResponse<FlowDocument> {
    serde_json::from_value(json!({
        "time_out": true,
        "hits": { "total": { "value": 0 }, "hits": [] }
    }))
    .expect("test response should decode")
}

pub fn empty_response() -> SearchResponse<FlowDocument> {
    hits_response(Vec::new())
}
