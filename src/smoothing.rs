//! Bounded rolling windows
//!
//! Fixed-capacity FIFO buffers used for EAR smoothing and for the raw
//! attentive/distracted decision history. When full, the oldest value is
//! evicted on push.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Fixed-capacity ring buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingWindow<T> {
    values: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingWindow<T> {
    /// Create an empty window; a zero capacity is raised to 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: T) {
        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Change capacity, keeping the most recent values
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }
}

impl RollingWindow<f64> {
    /// Arithmetic mean of the window, `None` when empty
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let sum: f64 = self.values.iter().sum();
        Some(sum / self.values.len() as f64)
    }
}

impl RollingWindow<bool> {
    /// Number of `true` entries
    pub fn count_true(&self) -> usize {
        self.values.iter().filter(|v| **v).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = RollingWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            window.push(v);
        }

        assert_eq!(window.len(), 3);
        assert_eq!(window.iter().copied().collect::<Vec<_>>(), vec![3.0, 4.0, 5.0]);
        assert!((window.mean().unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_mean_is_none() {
        let window: RollingWindow<f64> = RollingWindow::new(3);
        assert!(window.mean().is_none());
    }

    #[test]
    fn test_count_true() {
        let mut window = RollingWindow::new(5);
        for v in [true, false, true, true] {
            window.push(v);
        }
        assert_eq!(window.count_true(), 3);
    }

    #[test]
    fn test_shrink_keeps_most_recent() {
        let mut window = RollingWindow::new(5);
        for v in 1..=5 {
            window.push(v);
        }

        window.set_capacity(2);
        assert_eq!(window.iter().copied().collect::<Vec<_>>(), vec![4, 5]);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut window = RollingWindow::new(0);
        window.push(true);
        window.push(false);
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.count_true(), 0);
    }
}
