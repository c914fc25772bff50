use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a transfer, as reported through progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Connecting,
    Sending,
    Receiving,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl TransferStatus {
    /// Returns `true` for states a transfer can never leave.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Sending => "sending",
            Self::Receiving => "receiving",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A progress report for a single transfer.
///
/// `progress` is 0–100; `speed_mbps` is averaged over the interval since
/// the previous report (0.0 on the first one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub transfer_id: String,
    pub status: TransferStatus,
    pub filename: String,
    pub progress: u8,
    pub bytes: u64,
    pub total: u64,
    pub speed_mbps: f64,
}

impl TransferProgress {
    /// Percentage of `bytes` against `total`, clamped to 0–100.
    pub fn percent(bytes: u64, total: u64) -> u8 {
        if total == 0 {
            return 100;
        }
        ((bytes.saturating_mul(100) / total).min(100)) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_terminal_classification() {
        assert!(TransferStatus::Completed.is_terminal());
        assert!(TransferStatus::Cancelled.is_terminal());
        assert!(TransferStatus::Failed.is_terminal());
        assert!(!TransferStatus::Connecting.is_terminal());
        assert!(!TransferStatus::Sending.is_terminal());
        assert!(!TransferStatus::Receiving.is_terminal());
        assert!(!TransferStatus::Paused.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TransferStatus::Receiving).unwrap(),
            "\"receiving\""
        );
        assert_eq!(TransferStatus::Connecting.to_string(), "connecting");
    }

    #[test]
    fn percent_bounds() {
        assert_eq!(TransferProgress::percent(0, 200), 0);
        assert_eq!(TransferProgress::percent(100, 200), 50);
        assert_eq!(TransferProgress::percent(200, 200), 100);
        // Empty files are complete the moment the stream opens.
        assert_eq!(TransferProgress::percent(0, 0), 100);
    }

    #[test]
    fn progress_event_wire_shape() {
        let p = TransferProgress {
            transfer_id: "t-9".into(),
            status: TransferStatus::Sending,
            filename: "iso.img".into(),
            progress: 42,
            bytes: 420,
            total: 1000,
            speed_mbps: 11.5,
        };
        let json: serde_json::Value = serde_json::to_value(&p).unwrap();
        assert_eq!(json["transferId"], "t-9");
        assert_eq!(json["status"], "sending");
        assert_eq!(json["speedMbps"], 11.5);
    }
}
