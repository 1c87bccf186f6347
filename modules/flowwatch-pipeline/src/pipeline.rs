use std::fmt;
use std::path::PathBuf;

use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use flowwatch_common::{ErrorPolicy, FlowwatchError, Result, ScoredBatch, Watermark};

use crate::alert_log::AlertLog;
use crate::extractor::Extractor;
use crate::lock::RunLock;
use crate::scorer::Scorer;

/// Stats from a pipeline run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunStats {
    pub extracted: u64,
    pub scored: u64,
    pub logged: u64,
    pub malicious: u64,
    pub watermark: Option<Watermark>,
    /// A newer watermark was persisted this run.
    pub advanced: bool,
    /// Another run held the lock; nothing was attempted.
    pub skipped: bool,
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let watermark = self
            .watermark
            .as_ref()
            .map(|w| w.as_str())
            .unwrap_or("-");
        write!(
            f,
            "extracted={} scored={} logged={} malicious={} watermark={} advanced={}",
            self.extracted, self.scored, self.logged, self.malicious, watermark, self.advanced,
        )
    }
}

/// One bounded pass: read cursor, extract, score, log.
pub struct Pipeline {
    extractor: Extractor,
    scorer: Scorer,
    alerts: AlertLog,
    policy: ErrorPolicy,
    lock_path: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(extractor: Extractor, scorer: Scorer, alerts: AlertLog) -> Self {
        Self {
            extractor,
            scorer,
            alerts,
            policy: ErrorPolicy::default(),
            lock_path: None,
        }
    }

    /// How score and log failures are handled. Extraction failures always abort.
    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Guard runs with a lock file so overlapping invocations back off.
    pub fn with_lock(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    /// Run once. Holds the lock (if configured) for the whole pass.
    pub async fn run(&self) -> Result<RunStats> {
        let _lock = match &self.lock_path {
            Some(path) => match RunLock::acquire(path)? {
                Some(lock) => Some(lock),
                None => {
                    warn!(path = %path.display(), "Another run holds the lock, exiting");
                    return Ok(RunStats {
                        skipped: true,
                        ..RunStats::default()
                    });
                }
            },
            None => None,
        };

        let span = tracing::info_span!("run", run_id = %Uuid::new_v4());
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> Result<RunStats> {
        let mut stats = RunStats::default();

        // Stage 1: extract. Persists the advanced watermark on success.
        let extraction = self.extractor.extract().await?;
        stats.extracted = extraction.batch.len() as u64;
        stats.watermark = Some(extraction.watermark);
        stats.advanced = extraction.advanced;

        // Stage 2: score.
        let scored = match self.scorer.score(extraction.batch).await {
            Ok(scored) => scored,
            Err(e) => {
                self.stage_failed("score", e)?;
                ScoredBatch::empty()
            }
        };
        stats.scored = scored.len() as u64;
        stats.malicious = scored.malicious_count() as u64;

        // Stage 3: log.
        match self.alerts.append(&scored) {
            Ok(lines) => stats.logged = lines as u64,
            Err(e) => self.stage_failed("log", e)?,
        }

        info!("Run complete. {stats}");
        Ok(stats)
    }

    /// Apply the error policy: propagate under `Abort`, swallow under `Continue`.
    fn stage_failed(&self, stage: &'static str, err: FlowwatchError) -> Result<()> {
        match self.policy {
            ErrorPolicy::Abort => Err(err),
            ErrorPolicy::Continue => {
                error!(stage, error = %err, "Stage failed, continuing");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_display() {
        let stats = RunStats {
            extracted: 2,
            scored: 2,
            logged: 2,
            malicious: 1,
            watermark: Watermark::parse("2024-03-01T12:00:00.000Z"),
            advanced: true,
            skipped: false,
        };
        assert_eq!(
            stats.to_string(),
            "extracted=2 scored=2 logged=2 malicious=1 \
             watermark=2024-03-01T12:00:00.000Z advanced=true"
        );
        assert!(RunStats::default()
            .to_string()
            .ends_with("watermark=- advanced=false"));
    }
}
