use std::collections::VecDeque;

use photon_shared::HistoryPoint;

use crate::config::CHART_HISTORY_CAPACITY;

/// Bounded congestion/flow series backing the history chart.
#[derive(Debug, Clone)]
pub struct ChartHistory {
    points: VecDeque<HistoryPoint>,
    capacity: usize,
}

impl Default for ChartHistory {
    fn default() -> Self {
        Self::with_capacity(CHART_HISTORY_CAPACITY)
    }
}

impl ChartHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Replace the series with the newest `capacity` points.
    pub fn replace(&mut self, points: Vec<HistoryPoint>) {
        let skip = points.len().saturating_sub(self.capacity);
        self.points.clear();
        self.points.extend(points.into_iter().skip(skip));
    }

    pub fn points(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.points.iter()
    }

    pub fn latest(&self) -> Option<&HistoryPoint> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
