//! Append-only text log of scored flows.
//!
//! Every scored flow gets a line, benign ones included; the `Malicious=` field
//! carries the classification.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use flowwatch_common::{FlowwatchError, Result, ScoredBatch, ScoredFlow};

/// File name of the alert log inside the configured directory.
pub const ALERT_LOG_FILE: &str = "netflow-detected.log";

/// One line, no trailing newline.
pub fn format_line(flow: &ScoredFlow) -> String {
    format!(
        "Flow IDS prediction: Timestamp={}, Score={:.6}, Malicious={}, Source={}:{}, Destination={}:{}, Protocol={}, ExporterIp={}",
        flow.exporter.timestamp,
        flow.score,
        flow.is_malicious(),
        flow.record.source_ipv4_address,
        flow.record.source_transport_port,
        flow.record.destination_ipv4_address,
        flow.record.destination_transport_port,
        flow.record.protocol_identifier,
        flow.exporter.address,
    )
}

pub struct AlertLog {
    path: PathBuf,
}

impl AlertLog {
    /// Log at `<dir>/netflow-detected.log`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(ALERT_LOG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line per flow in a single write. Returns the number of lines.
    ///
    /// An empty batch touches nothing on disk.
    pub fn append(&self, batch: &ScoredBatch) -> Result<usize> {
        if batch.is_empty() {
            debug!("No scored flows, alert log untouched");
            return Ok(0);
        }

        let mut text = batch
            .flows()
            .iter()
            .map(format_line)
            .collect::<Vec<_>>()
            .join("\n");
        text.push('\n');

        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| FlowwatchError::io(dir, e))?;
        }

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| FlowwatchError::io(&self.path, e))?;
        file.write_all(text.as_bytes())
            .map_err(|e| FlowwatchError::io(&self.path, e))?;

        info!(
            lines = batch.len(),
            malicious = batch.malicious_count(),
            path = %self.path.display(),
            "Alert log appended"
        );
        Ok(batch.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowwatch_common::{Batch, ExporterInfo, FlowEntry, FlowRecord};
    use std::net::Ipv4Addr;

    fn entry(dport: u16) -> FlowEntry {
        FlowEntry {
            record: FlowRecord {
                source_ipv4_address: Ipv4Addr::new(10, 1, 2, 3),
                destination_ipv4_address: Ipv4Addr::new(93, 184, 216, 34),
                source_ipv4_prefix_length: 0,
                destination_ipv4_prefix_length: 0,
                source_transport_port: 50123,
                destination_transport_port: dport,
                protocol_identifier: 6,
                packet_delta_count: 4,
                octet_delta_count: 320,
                tcp_control_bits: 2,
                flow_duration_milliseconds: 12,
                post_packet_delta_count: 0,
                post_octet_delta_count: 0,
                ixia_l7_app_id: 0,
            },
            exporter: ExporterInfo {
                address: "172.16.0.1:2055".to_string(),
                timestamp: "2024-03-01T12:00:00.000Z".to_string(),
            },
        }
    }

    fn scored(scores: &[f32]) -> ScoredBatch {
        let entries = scores.iter().map(|_| entry(443)).collect();
        ScoredBatch::zip(Batch::new(entries), scores.to_vec()).unwrap()
    }

    #[test]
    fn line_format() {
        let batch = scored(&[0.9]);
        assert_eq!(
            format_line(&batch.flows()[0]),
            "Flow IDS prediction: Timestamp=2024-03-01T12:00:00.000Z, Score=0.900000, Malicious=true, \
             Source=10.1.2.3:50123, Destination=93.184.216.34:443, Protocol=6, ExporterIp=172.16.0.1:2055"
        );
    }

    #[test]
    fn boundary_score_is_benign() {
        let batch = scored(&[0.5, 0.500001]);
        assert!(format_line(&batch.flows()[0]).contains("Score=0.500000, Malicious=false"));
        assert!(format_line(&batch.flows()[1]).contains("Score=0.500001, Malicious=true"));
    }

    #[test]
    fn empty_batch_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = AlertLog::in_dir(dir.path().join("log"));

        assert_eq!(log.append(&ScoredBatch::empty()).unwrap(), 0);
        assert!(!log.path().exists());
        assert!(!dir.path().join("log").exists());
    }

    #[test]
    fn appends_across_runs_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let log = AlertLog::in_dir(dir.path());

        assert_eq!(log.append(&scored(&[0.9, 0.1])).unwrap(), 2);
        assert_eq!(log.append(&scored(&[0.7])).unwrap(), 1);

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.ends_with('\n'));
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("Score=0.900000"));
        assert!(lines[1].contains("Score=0.100000"));
        assert!(lines[2].contains("Score=0.700000"));
    }

    #[test]
    fn unwritable_destination_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("log");
        std::fs::write(&blocker, "a file where the directory should be").unwrap();

        let err = AlertLog::in_dir(&blocker).append(&scored(&[0.9])).unwrap_err();
        assert!(matches!(err, FlowwatchError::Io { .. }));
    }
}
