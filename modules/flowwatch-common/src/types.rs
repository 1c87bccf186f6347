use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{FlowwatchError, Result};

/// Scores strictly above this are classified malicious.
pub const MALICIOUS_THRESHOLD: f32 = 0.5;

// --- Flow documents ---

/// One observed network flow as indexed by the collector.
///
/// The same field names go out verbatim in the scoring request. Address and
/// protocol are required by the extraction query, so they are required here
/// too; the counters fall back to zero when an exporter does not report them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub source_ipv4_address: Ipv4Addr,
    pub destination_ipv4_address: Ipv4Addr,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source_ipv4_prefix_length: u8,
    #[serde(default, deserialize_with = "null_as_default")]
    pub destination_ipv4_prefix_length: u8,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source_transport_port: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub destination_transport_port: u16,
    pub protocol_identifier: u8,
    #[serde(default, deserialize_with = "null_as_default")]
    pub packet_delta_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub octet_delta_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tcp_control_bits: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub flow_duration_milliseconds: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub post_packet_delta_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub post_octet_delta_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ixia_l7_app_id: u64,
}

/// Exporters send explicit `null` for counters they do not track; treat it
/// the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The device that reported a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExporterInfo {
    pub address: String,
    pub timestamp: String,
}

/// `_source.netflow`: flow fields and exporter metadata side by side.
#[derive(Debug, Clone, Deserialize)]
pub struct NetflowSource {
    #[serde(flatten)]
    pub record: FlowRecord,
    pub exporter: ExporterInfo,
}

/// The `_source` of one search hit.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowDocument {
    pub netflow: NetflowSource,
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
}

// --- Watermark ---

/// Last `@timestamp` consumed by a successful extraction.
///
/// Kept as the exact string the backend returned so it round-trips into the
/// next range query without precision loss.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Watermark(String);

impl Watermark {
    pub const EPOCH: &'static str = "1970-01-01T00:00:00.000Z";

    pub fn epoch() -> Self {
        Self(Self::EPOCH.to_string())
    }

    /// Accepts any RFC 3339 timestamp; surrounding whitespace is trimmed.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        DateTime::parse_from_rfc3339(trimmed).ok()?;
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.0)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Strictly later than `other`. Unparseable values never compare as later.
    pub fn is_after(&self, other: &Watermark) -> bool {
        match (self.as_datetime(), other.as_datetime()) {
            (Some(a), Some(b)) => a > b,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::epoch()
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Batches ---

/// A flow and the exporter that reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowEntry {
    pub record: FlowRecord,
    pub exporter: ExporterInfo,
}

impl From<FlowDocument> for FlowEntry {
    fn from(doc: FlowDocument) -> Self {
        Self {
            record: doc.netflow.record,
            exporter: doc.netflow.exporter,
        }
    }
}

/// Everything one extraction produced, in backend order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub entries: Vec<FlowEntry>,
}

impl Batch {
    pub fn new(entries: Vec<FlowEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn records(&self) -> Vec<&FlowRecord> {
        self.entries.iter().map(|e| &e.record).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFlow {
    pub record: FlowRecord,
    pub exporter: ExporterInfo,
    pub score: f32,
}

impl ScoredFlow {
    pub fn is_malicious(&self) -> bool {
        self.score > MALICIOUS_THRESHOLD
    }
}

/// A batch with exactly one score per entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoredBatch {
    flows: Vec<ScoredFlow>,
}

impl ScoredBatch {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Pair scores with entries by position. A count mismatch means the
    /// scoring service broke its contract; nothing is guessed.
    pub fn zip(batch: Batch, scores: Vec<f32>) -> Result<Self> {
        if batch.len() != scores.len() {
            return Err(FlowwatchError::Contract(format!(
                "scored {} flows but batch holds {}",
                scores.len(),
                batch.len()
            )));
        }

        let flows = batch
            .entries
            .into_iter()
            .zip(scores)
            .map(|(entry, score)| ScoredFlow {
                record: entry.record,
                exporter: entry.exporter,
                score,
            })
            .collect();

        Ok(Self { flows })
    }

    pub fn flows(&self) -> &[ScoredFlow] {
        &self.flows
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn malicious_count(&self) -> usize {
        self.flows.iter().filter(|f| f.is_malicious()).count()
    }
}
