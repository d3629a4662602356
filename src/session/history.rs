use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;

use crate::frame::BoundingBox;

/// One processed frame: when it was seen and who was in it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionEvent {
    timestamp: DateTime<Local>,
    count: usize,
    regions: Vec<BoundingBox>,
}

impl DetectionEvent {
    pub fn new(timestamp: DateTime<Local>, regions: Vec<BoundingBox>) -> Self {
        Self {
            timestamp,
            count: regions.len(),
            regions,
        }
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn regions(&self) -> &[BoundingBox] {
        &self.regions
    }
}

/// Rolling statistics over the most recent events.
///
/// `average_count` is rounded to one decimal place, half away from zero
/// (0.25 becomes 0.3, 0.65 becomes 0.7).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub current_count: usize,
    pub average_count: f64,
    pub max_count: usize,
}

/// Bounded FIFO of events; pushing past capacity evicts the oldest.
#[derive(Clone, Debug)]
pub(crate) struct History {
    events: VecDeque<DetectionEvent>,
    capacity: usize,
}

impl History {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, event: DetectionEvent) {
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    /// The last `limit` events, oldest first.
    pub(crate) fn recent(&self, limit: usize) -> Vec<DetectionEvent> {
        let skip = self.events.len().saturating_sub(limit);
        self.events.iter().skip(skip).cloned().collect()
    }

    pub(crate) fn stats(&self, window: usize) -> StatsSnapshot {
        let skip = self.events.len().saturating_sub(window.max(1));
        let counts: Vec<usize> = self.events.iter().skip(skip).map(|e| e.count).collect();
        let Some(&current_count) = counts.last() else {
            return StatsSnapshot::default();
        };
        let mean = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
        StatsSnapshot {
            current_count,
            average_count: round_tenths(mean),
            max_count: counts.iter().copied().max().unwrap_or(0),
        }
    }
}

fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(count: usize) -> DetectionEvent {
        let regions = (0..count)
            .map(|i| BoundingBox::new(i as f32, 0.0, i as f32 + 1.0, 1.0))
            .collect();
        DetectionEvent::new(Local::now(), regions)
    }

    fn history_of(counts: &[usize]) -> History {
        let mut history = History::new(10);
        for &count in counts {
            history.push(event(count));
        }
        history
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut history = History::new(3);
        for count in 1..=5 {
            history.push(event(count));
        }
        assert_eq!(history.len(), 3);
        let counts: Vec<_> = history.recent(10).iter().map(|e| e.count()).collect();
        assert_eq!(counts, [3, 4, 5]);
    }

    #[test]
    fn recent_is_oldest_first() {
        let history = history_of(&[1, 2, 3, 4, 5, 6]);
        let counts: Vec<_> = history.recent(2).iter().map(|e| e.count()).collect();
        assert_eq!(counts, [5, 6]);
    }

    #[test]
    fn stats_use_window_only() {
        let history = history_of(&[9, 1, 1]);
        let stats = history.stats(2);
        assert_eq!(stats.current_count, 1);
        assert_eq!(stats.max_count, 1);
        assert_eq!(stats.average_count, 1.0);
    }

    #[test]
    fn averages_round_half_away_from_zero() {
        assert_eq!(history_of(&[1, 0]).stats(10).average_count, 0.5);
        assert_eq!(history_of(&[1, 1, 0]).stats(10).average_count, 0.7);
        assert_eq!(history_of(&[1, 0, 0]).stats(10).average_count, 0.3);
        assert_eq!(round_tenths(0.25), 0.3);
    }

    #[test]
    fn empty_history_reports_zero() {
        assert_eq!(History::new(10).stats(10), StatsSnapshot::default());
    }
}
