//! Incremental extraction: everything indexed after the watermark, up to now.
//!
//! The query is bounded to a single page. There is no pagination, so a window
//! holding more than [`PAGE_SIZE`] flows is truncated; the watermark still
//! advances to the last returned hit, and the remainder of that window is
//! picked up by later runs only if it sorts after that hit.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use flowwatch_common::{Batch, FlowEntry, FlowwatchError, Result, Watermark};

use crate::cursor::CursorStore;
use crate::traits::FlowSource;

/// Maximum hits requested per run.
pub const PAGE_SIZE: usize = 10_000;

/// Event timestamp field used for the range filter and the sort.
pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// Fields pulled from `_source`: the flow record, its exporter, and the event timestamp.
const SOURCE_FIELDS: &[&str] = &[
    "netflow.source_ipv4_address",
    "netflow.destination_ipv4_address",
    "netflow.source_ipv4_prefix_length",
    "netflow.destination_ipv4_prefix_length",
    "netflow.source_transport_port",
    "netflow.destination_transport_port",
    "netflow.protocol_identifier",
    "netflow.packet_delta_count",
    "netflow.octet_delta_count",
    "netflow.tcp_control_bits",
    "netflow.flow_duration_milliseconds",
    "netflow.post_packet_delta_count",
    "netflow.post_octet_delta_count",
    "netflow.ixia_l7_app_id",
    "netflow.exporter.address",
    "netflow.exporter.timestamp",
    TIMESTAMP_FIELD,
];

/// Fields a document must carry to be worth scoring.
const REQUIRED_FIELDS: &[&str] = &[
    "netflow.source_ipv4_address",
    "netflow.destination_ipv4_address",
    "netflow.protocol_identifier",
];

/// Query for netflow documents with `watermark < @timestamp <= now`, oldest first.
pub fn build_query(watermark: &Watermark) -> Value {
    let mut must = vec![json!({ "match": { "input.type": "netflow" } })];
    must.extend(
        REQUIRED_FIELDS
            .iter()
            .map(|field| json!({ "exists": { "field": field } })),
    );

    json!({
        "size": PAGE_SIZE,
        "query": {
            "bool": {
                "must": must,
                "filter": [
                    { "range": { TIMESTAMP_FIELD: { "gt": watermark.as_str(), "lte": "now" } } }
                ]
            }
        },
        "_source": SOURCE_FIELDS,
        "sort": [ { TIMESTAMP_FIELD: { "order": "asc" } } ]
    })
}

/// Outcome of one extraction.
#[derive(Debug)]
pub struct Extraction {
    pub batch: Batch,
    /// Watermark in effect after this extraction.
    pub watermark: Watermark,
    /// Whether a new watermark was persisted.
    pub advanced: bool,
}

pub struct Extractor {
    source: Arc<dyn FlowSource>,
    cursor: Arc<dyn CursorStore>,
}

impl Extractor {
    pub fn new(source: Arc<dyn FlowSource>, cursor: Arc<dyn CursorStore>) -> Self {
        Self { source, cursor }
    }

    /// Fetch flows newer than the persisted watermark.
    ///
    /// On a non-empty result the watermark is advanced and persisted before the
    /// batch is returned. Empty or timed-out responses leave it untouched.
    pub async fn extract(&self) -> Result<Extraction> {
        let previous = self.cursor.read();
        let query = build_query(&previous);
        info!(since = %previous, "Querying flows since watermark");

        let response = self.source.search(&query).await?;
        if response.is_empty() {
            info!(
                time_out = response.time_out,
                total = response.hits.total.value,
                "No new flows"
            );
            return Ok(Extraction {
                batch: Batch::default(),
                watermark: previous,
                advanced: false,
            });
        }

        let hits = response.hits.hits;
        if hits.len() >= PAGE_SIZE {
            warn!(
                returned = hits.len(),
                total = response.hits.total.value,
                "Page limit reached, remaining flows in this window are not fetched this run"
            );
        }

        // Non-empty was checked above.
        let last_timestamp = hits
            .last()
            .map(|hit| hit.source.timestamp.clone())
            .unwrap_or_default();
        let next = Watermark::parse(&last_timestamp).ok_or_else(|| FlowwatchError::Decode {
            stage: "extract",
            message: format!("last hit has unusable @timestamp '{last_timestamp}'"),
        })?;

        let (watermark, advanced) = if next.is_after(&previous) {
            self.cursor.write(&next)?;
            (next, true)
        } else {
            warn!(
                previous = %previous,
                last_hit = %next,
                "Last hit is not newer than the watermark, keeping it"
            );
            (previous, false)
        };

        let batch = Batch::new(hits.into_iter().map(|hit| FlowEntry::from(hit.source)).collect());
        info!(count = batch.len(), watermark = %watermark, "Extracted flows");

        Ok(Extraction {
            batch,
            watermark,
            advanced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_window_and_ordering() {
        let query = build_query(&Watermark::epoch());

        assert_eq!(query["size"], 10_000);
        let range = &query["query"]["bool"]["filter"][0]["range"]["@timestamp"];
        assert_eq!(range["gt"], "1970-01-01T00:00:00.000Z");
        assert_eq!(range["lte"], "now");
        assert_eq!(query["sort"][0]["@timestamp"]["order"], "asc");
    }

    #[test]
    fn query_requires_netflow_type_and_geometry_fields() {
        let query = build_query(&Watermark::epoch());
        let must = query["query"]["bool"]["must"].as_array().unwrap();

        assert_eq!(must.len(), 4);
        assert_eq!(must[0]["match"]["input.type"], "netflow");
        let exists: Vec<_> = must[1..]
            .iter()
            .map(|m| m["exists"]["field"].as_str().unwrap())
            .collect();
        assert_eq!(exists, REQUIRED_FIELDS);
    }

    #[test]
    fn source_selection_covers_record_exporter_and_timestamp() {
        let query = build_query(&Watermark::epoch());
        let fields: Vec<_> = query["_source"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f.as_str().unwrap())
            .collect();

        assert_eq!(fields.len(), 17);
        assert!(fields.contains(&"netflow.ixia_l7_app_id"));
        assert!(fields.contains(&"netflow.exporter.timestamp"));
        assert_eq!(fields.last(), Some(&"@timestamp"));
    }

    #[test]
    fn watermark_is_passed_through_verbatim() {
        let wm = Watermark::parse("2024-03-01T12:00:00.123456789Z").unwrap();
        let query = build_query(&wm);
        assert_eq!(
            query["query"]["bool"]["filter"][0]["range"]["@timestamp"]["gt"],
            "2024-03-01T12:00:00.123456789Z"
        );
    }
}
