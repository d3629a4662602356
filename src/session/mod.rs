//! Detection sessions.
//!
//! A `DetectionSession` turns `(frame, regions)` pairs from a detector into
//! annotated frames and keeps a short rolling history for statistics. It
//! never calls a detector itself; the runtime owns the backend and feeds the
//! session its output.
//!
//! A session is tied to one detector method. Switching methods means building
//! a new session, so history never mixes methods.

mod history;

use chrono::Local;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::annotate::{self, OverlayPlan};
use crate::config::{AppConfig, DisplaySettings, StatsSettings};
use crate::detect::DetectorMethod;
use crate::frame::{BoundingBox, Frame};

pub use history::{DetectionEvent, StatsSnapshot};
use history::History;

/// Display format for overlay timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Output of `DetectionSession::process`.
#[derive(Clone, Debug)]
pub struct ProcessedFrame {
    pub annotated: Frame,
    pub count: usize,
    pub overlay: OverlayPlan,
}

pub struct DetectionSession {
    method: DetectorMethod,
    stats: StatsSettings,
    display: DisplaySettings,
    history: Mutex<History>,
}

impl DetectionSession {
    pub fn new(method: DetectorMethod, config: &AppConfig) -> Self {
        Self {
            method,
            stats: config.stats.clone(),
            display: config.display.clone(),
            history: Mutex::new(History::new(config.stats.history_capacity)),
        }
    }

    pub fn method(&self) -> DetectorMethod {
        self.method
    }

    /// Record one frame's detections and return an annotated copy.
    ///
    /// Regions are normalized and clipped to the frame but otherwise kept as
    /// given, in order. `frame` itself is never modified.
    pub fn process(&self, frame: &Frame, regions: &[BoundingBox]) -> ProcessedFrame {
        let regions: Vec<BoundingBox> = regions
            .iter()
            .map(|r| r.normalized(frame.width(), frame.height()))
            .collect();
        let event = DetectionEvent::new(Local::now(), regions);
        let count = event.count();
        let timestamp = event.timestamp().format(TIMESTAMP_FORMAT).to_string();
        let overlay = annotate::plan(event.regions(), &timestamp, self.method, &self.display);

        self.lock_history().push(event);

        let annotated = annotate::render(frame, &overlay, &self.display);
        ProcessedFrame {
            annotated,
            count,
            overlay,
        }
    }

    pub fn get_current_stats(&self) -> StatsSnapshot {
        self.lock_history().stats(self.stats.window)
    }

    /// The most recent `limit` events, oldest first.
    pub fn get_detection_history(&self, limit: usize) -> Vec<DetectionEvent> {
        self.lock_history().recent(limit)
    }

    /// History using the configured default limit.
    pub fn recent_history(&self) -> Vec<DetectionEvent> {
        self.get_detection_history(self.stats.history_limit)
    }

    fn lock_history(&self) -> MutexGuard<'_, History> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> DetectionSession {
        DetectionSession::new(DetectorMethod::Hog, &AppConfig::default())
    }

    fn boxes(n: usize) -> Vec<BoundingBox> {
        (0..n)
            .map(|i| BoundingBox::new(20.0 * i as f32 + 100.0, 200.0, 20.0 * i as f32 + 110.0, 260.0))
            .collect()
    }

    #[test]
    fn history_is_capped_and_fifo() {
        let session = session();
        let frame = Frame::filled(320, 320, [0, 0, 0]);
        for n in 0..12 {
            session.process(&frame, &boxes(n % 4));
        }
        let history = session.get_detection_history(100);
        assert_eq!(history.len(), 10);
        let counts: Vec<_> = history.iter().map(|e| e.count()).collect();
        assert_eq!(counts, [2, 3, 0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn default_history_limit_is_five() {
        let session = session();
        let frame = Frame::filled(64, 64, [0, 0, 0]);
        for _ in 0..8 {
            session.process(&frame, &[]);
        }
        assert_eq!(session.recent_history().len(), 5);
    }

    #[test]
    fn stats_over_two_four_six() {
        let session = session();
        let frame = Frame::filled(320, 320, [0, 0, 0]);
        for n in [2, 4, 6] {
            session.process(&frame, &boxes(n));
        }
        let stats = session.get_current_stats();
        assert_eq!(stats.current_count, 6);
        assert_eq!(stats.average_count, 4.0);
        assert_eq!(stats.max_count, 6);
    }

    #[test]
    fn empty_session_has_zero_stats() {
        assert_eq!(session().get_current_stats(), StatsSnapshot::default());
    }

    #[test]
    fn regions_are_normalized_before_recording() {
        let session = session();
        let frame = Frame::filled(100, 100, [0, 0, 0]);
        let processed = session.process(&frame, &[BoundingBox::new(120.0, 90.0, 40.0, -5.0)]);
        assert_eq!(processed.count, 1);
        let history = session.get_detection_history(1);
        assert_eq!(history[0].regions(), [BoundingBox::new(40.0, 0.0, 100.0, 90.0)]);
    }

    #[test]
    fn status_line_names_method() {
        let session = DetectionSession::new(DetectorMethod::Neural, &AppConfig::default());
        let frame = Frame::filled(64, 64, [0, 0, 0]);
        let processed = session.process(&frame, &[]);
        assert_eq!(processed.overlay.lines[1].text, "Status: Detecting (YOLO)");
        assert_eq!(processed.overlay.lines[2].text, "Total Persons: 0");
    }
}
