//! Progress event throttling.
//!
//! Progress must never stall the data plane: events go out through
//! `try_send` and are dropped on a full channel. Each transfer reports at
//! most once per 500 ms, plus a guaranteed event at the start and at the
//! final byte count.

use std::time::Instant;

use tokio::sync::mpsc;
use tracing::trace;

use etherlink_protocol::{PROGRESS_INTERVAL, TransferProgress, TransferStatus};

use crate::TransferEvent;

const MIB: f64 = 1024.0 * 1024.0;

/// Per-transfer progress reporter with rate limiting and speed tracking.
pub struct ProgressThrottle {
    transfer_id: String,
    filename: String,
    status: TransferStatus,
    total: u64,
    events_tx: mpsc::Sender<TransferEvent>,
    last_emit: Option<Instant>,
    last_bytes: u64,
}

impl ProgressThrottle {
    pub fn new(
        transfer_id: String,
        filename: String,
        status: TransferStatus,
        total: u64,
        events_tx: mpsc::Sender<TransferEvent>,
    ) -> Self {
        Self {
            transfer_id,
            filename,
            status,
            total,
            events_tx,
            last_emit: None,
            last_bytes: 0,
        }
    }

    /// Reports progress if the throttle window has elapsed.
    pub fn tick(&mut self, bytes: u64) {
        let now = Instant::now();
        if let Some(prev) = self.last_emit {
            if now.duration_since(prev) < PROGRESS_INTERVAL {
                return;
            }
        }
        self.emit(bytes, now);
    }

    /// Reports progress unconditionally (start and final-byte boundaries).
    pub fn force(&mut self, bytes: u64) {
        self.emit(bytes, Instant::now());
    }

    fn emit(&mut self, bytes: u64, now: Instant) {
        let speed_mbps = match self.last_emit {
            Some(prev) => {
                let secs = now.duration_since(prev).as_secs_f64();
                if secs > 0.0 {
                    bytes.saturating_sub(self.last_bytes) as f64 / secs / MIB
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        let event = TransferProgress {
            transfer_id: self.transfer_id.clone(),
            status: self.status,
            filename: self.filename.clone(),
            progress: TransferProgress::percent(bytes, self.total),
            bytes,
            total: self.total,
            speed_mbps,
        };
        trace!(transfer = %self.transfer_id, bytes, "progress");

        // Best effort: a slow consumer loses ticks, never data throughput.
        let _ = self.events_tx.try_send(TransferEvent::Progress(event));

        self.last_emit = Some(now);
        self.last_bytes = bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle(total: u64) -> (ProgressThrottle, mpsc::Receiver<TransferEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (
            ProgressThrottle::new(
                "t-1".into(),
                "file.bin".into(),
                TransferStatus::Sending,
                total,
                tx,
            ),
            rx,
        )
    }

    fn drain(rx: &mut mpsc::Receiver<TransferEvent>) -> Vec<TransferProgress> {
        let mut out = Vec::new();
        while let Ok(TransferEvent::Progress(p)) = rx.try_recv() {
            out.push(p);
        }
        out
    }

    #[tokio::test]
    async fn rapid_ticks_are_suppressed() {
        let (mut throttle, mut rx) = throttle(1000);

        throttle.force(0);
        for bytes in 1..100 {
            throttle.tick(bytes);
        }

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].bytes, 0);
    }

    #[tokio::test]
    async fn boundaries_are_always_reported() {
        let (mut throttle, mut rx) = throttle(1000);

        throttle.force(0);
        throttle.tick(500);
        throttle.force(1000);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].bytes, 0);
        assert_eq!(events[0].progress, 0);
        assert_eq!(events[1].bytes, 1000);
        assert_eq!(events[1].progress, 100);
    }

    #[tokio::test]
    async fn bytes_are_monotone_in_emitted_order() {
        let (mut throttle, mut rx) = throttle(10_000);

        throttle.force(0);
        throttle.force(2500);
        throttle.force(7000);
        throttle.force(10_000);

        let events = drain(&mut rx);
        let bytes: Vec<u64> = events.iter().map(|p| p.bytes).collect();
        let mut sorted = bytes.clone();
        sorted.sort_unstable();
        assert_eq!(bytes, sorted);
    }

    #[tokio::test]
    async fn speed_is_positive_between_samples() {
        let (mut throttle, mut rx) = throttle(1_000_000);

        throttle.force(0);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        throttle.force(500_000);

        let events = drain(&mut rx);
        assert_eq!(events[0].speed_mbps, 0.0);
        assert!(events[1].speed_mbps > 0.0);
    }

    #[tokio::test]
    async fn full_channel_does_not_block() {
        let (tx, _rx) = mpsc::channel(1);
        let mut throttle = ProgressThrottle::new(
            "t-1".into(),
            "file.bin".into(),
            TransferStatus::Receiving,
            100,
            tx,
        );

        // Fills the channel, then keeps going without blocking.
        for i in 0..10 {
            throttle.force(i * 10);
        }
    }
}
