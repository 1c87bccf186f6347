use serde::Deserialize;

/// Top-level body of a `_search` response.
///
/// Only the parts the pipeline reads are modelled; everything else the
/// backend returns (`took`, `_shards`, `max_score`, ...) is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse<T> {
    /// Elasticsearch spells this `timed_out`; some proxies in front of it
    /// (and older fixtures) use `time_out`. Both are accepted.
    #[serde(rename = "time_out", alias = "timed_out", default)]
    pub time_out: bool,
    pub hits: Hits<T>,
}

impl<T> SearchResponse<T> {
    /// True when the backend gave up or found nothing. Callers must not
    /// derive any progress from an empty response.
    pub fn is_empty(&self) -> bool {
        self.time_out || self.hits.total.value == 0 || self.hits.hits.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hits<T> {
    pub total: Total,
    pub hits: Vec<Hit<T>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Total {
    pub value: u64,
}

/// A single matching document.
#[derive(Debug, Clone, Deserialize)]
pub struct Hit<T> {
    #[serde(rename = "_source")]
    pub source: T,
}
