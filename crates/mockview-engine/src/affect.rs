//! Periodic nervousness sampling.
//!
//! On every tick the monitor grabs one frame, asks the detection backend
//! about it and, when the verdict is nervous with a score at or above the
//! threshold, stores the sample. Failures are logged and counted; they never
//! stop the loop. Stopping the monitor drops every in-flight request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::backend::{AffectBackend, AffectRequest, AffectSampleRecord};
use crate::media::FrameSource;

/// Counters for the monitor's activity.
#[derive(Debug, Default)]
pub struct AffectStats {
    frames_skipped: AtomicU64,
    samples_sent: AtomicU64,
    detection_failures: AtomicU64,
    samples_flagged: AtomicU64,
    samples_stored: AtomicU64,
    storage_failures: AtomicU64,
}

/// Point-in-time copy of [`AffectStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectStatsSnapshot {
    /// Ticks with no frame available.
    pub frames_skipped: u64,
    /// Frames sent for detection.
    pub samples_sent: u64,
    /// Detection calls that failed.
    pub detection_failures: u64,
    /// Verdicts that crossed the threshold.
    pub samples_flagged: u64,
    /// Flagged samples stored.
    pub samples_stored: u64,
    /// Storage calls that failed.
    pub storage_failures: u64,
}

impl AffectStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter.
    #[must_use]
    pub fn snapshot(&self) -> AffectStatsSnapshot {
        AffectStatsSnapshot {
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            samples_sent: self.samples_sent.load(Ordering::Relaxed),
            detection_failures: self.detection_failures.load(Ordering::Relaxed),
            samples_flagged: self.samples_flagged.load(Ordering::Relaxed),
            samples_stored: self.samples_stored.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
        }
    }
}

/// Monitor settings.
#[derive(Debug, Clone)]
pub struct AffectSettings {
    /// Session the samples belong to.
    pub session_id: String,
    /// Time between samples.
    pub interval: Duration,
    /// Minimum score for a nervous verdict to be stored.
    pub threshold: f64,
}

/// A running affect monitor. Dropping it stops the monitor.
#[derive(Debug)]
pub struct AffectMonitor {
    handle: JoinHandle<()>,
    stats: Arc<AffectStats>,
}

impl AffectMonitor {
    /// Starts sampling. The first sample is taken one interval from now.
    pub fn spawn(
        settings: AffectSettings,
        frames: Arc<dyn FrameSource>,
        backend: Arc<dyn AffectBackend>,
    ) -> Self {
        let stats = Arc::new(AffectStats::default());
        info!(session_id = %settings.session_id, interval_ms = settings.interval.as_millis(), "affect monitor started");
        let handle = tokio::spawn(run(settings, frames, backend, Arc::clone(&stats)));
        Self { handle, stats }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> AffectStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stops sampling and abandons in-flight requests.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for AffectMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(
    settings: AffectSettings,
    frames: Arc<dyn FrameSource>,
    backend: Arc<dyn AffectBackend>,
    stats: Arc<AffectStats>,
) {
    let mut ticker = interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    // dropped with this task, which aborts whatever is still running
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(frame) = frames.capture_frame() else {
                    AffectStats::bump(&stats.frames_skipped);
                    debug!("no frame available, skipping affect sample");
                    continue;
                };
                in_flight.spawn(sample(
                    Arc::clone(&backend),
                    Arc::clone(&stats),
                    settings.session_id.clone(),
                    frame.data,
                    settings.threshold,
                ));
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "affect sample task failed");
                }
            }
        }
    }
}

async fn sample(
    backend: Arc<dyn AffectBackend>,
    stats: Arc<AffectStats>,
    session_id: String,
    frame: String,
    threshold: f64,
) {
    AffectStats::bump(&stats.samples_sent);
    let verdict = match backend
        .analyze(AffectRequest {
            session_id: session_id.clone(),
            frame: frame.clone(),
        })
        .await
    {
        Ok(verdict) => verdict,
        Err(e) => {
            AffectStats::bump(&stats.detection_failures);
            warn!(error = %e, "affect detection failed");
            return;
        }
    };

    debug!(nervous = verdict.nervous, score = verdict.score, "affect verdict");
    if !verdict.nervous || verdict.score < threshold {
        return;
    }

    AffectStats::bump(&stats.samples_flagged);
    let record = AffectSampleRecord {
        session_id,
        frame: verdict.frame.unwrap_or(frame),
        score: verdict.score,
    };
    match backend.store(record).await {
        Ok(()) => AffectStats::bump(&stats.samples_stored),
        Err(e) => {
            AffectStats::bump(&stats.storage_failures);
            warn!(error = %e, "failed to store affect sample");
        }
    }
}
