use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    pub datagrams_lost: u64,
    pub datagrams_rejected: u64,
    pub octets_sent: u64,
    pub octets_received: u64,
}

/// Sliding-window integer average. Has no value until the window has filled once.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    samples: VecDeque<i32>,
    window: usize,
    sum: i64,
    filled: bool,
    min: Option<i32>,
    max: Option<i32>,
}

impl MovingAverage {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            samples: VecDeque::with_capacity(window),
            window,
            sum: 0,
            filled: false,
            min: None,
            max: None,
        }
    }

    pub fn add(&mut self, value: i32) {
        if self.samples.len() == self.window {
            if let Some(oldest) = self.samples.pop_front() {
                self.sum -= oldest as i64;
            }
        }
        self.samples.push_back(value);
        self.sum += value as i64;
        if self.samples.len() == self.window {
            self.filled = true;
        }
        self.min = Some(self.min.map_or(value, |min| min.min(value)));
        self.max = Some(self.max.map_or(value, |max| max.max(value)));
    }

    pub fn average(&self) -> Option<i32> {
        if !self.filled {
            return None;
        }
        Some((self.sum as f64 / self.samples.len() as f64).round() as i32)
    }

    pub fn last(&self) -> Option<i32> {
        self.samples.back().copied()
    }

    pub fn min(&self) -> Option<i32> {
        self.min
    }

    pub fn max(&self) -> Option<i32> {
        self.max
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.window);
    }
}

impl fmt::Display for MovingAverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.average(), self.min, self.max) {
            (Some(avg), Some(min), Some(max)) => write!(f, "avg {avg} (min {min}, max {max})"),
            _ => write!(f, "n/a"),
        }
    }
}

/// Counts events and reports the rate over the last completed period.
#[derive(Debug, Clone)]
pub struct PerSecond {
    period_ms: u64,
    period_start_ms: u64,
    count: u64,
    rate: Option<f32>,
}

impl PerSecond {
    pub fn new(now_ms: u64, period_ms: u64) -> Self {
        Self {
            period_ms: period_ms.max(1),
            period_start_ms: now_ms,
            count: 0,
            rate: None,
        }
    }

    pub fn add(&mut self, count: u64) {
        self.count += count;
    }

    pub fn update(&mut self, now_ms: u64) {
        let elapsed = now_ms.saturating_sub(self.period_start_ms);
        if elapsed < self.period_ms {
            return;
        }
        self.rate = Some(self.count as f32 * 1000.0 / elapsed as f32);
        self.count = 0;
        self.period_start_ms = now_ms;
    }

    pub fn rate(&self) -> Option<f32> {
        self.rate
    }
}

impl fmt::Display for PerSecond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rate {
            Some(rate) => write!(f, "{rate:.1}/s"),
            None => write!(f, "n/a"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_needs_full_window() {
        let mut stat = MovingAverage::new(3);
        stat.add(10);
        stat.add(20);
        assert_eq!(stat.average(), None);
        stat.add(30);
        assert_eq!(stat.average(), Some(20));
        stat.add(60);
        assert_eq!(stat.average(), Some(37));
        assert_eq!(stat.min(), Some(10));
        assert_eq!(stat.max(), Some(60));
    }

    #[test]
    fn test_clear_forgets_samples() {
        let mut stat = MovingAverage::new(1);
        stat.add(5);
        assert_eq!(stat.average(), Some(5));
        stat.clear();
        assert_eq!(stat.average(), None);
        assert_eq!(stat.last(), None);
    }

    #[test]
    fn test_per_second_rate() {
        let mut rate = PerSecond::new(1000, 1000);
        rate.add(30);
        rate.update(1500);
        assert_eq!(rate.rate(), None);
        rate.add(30);
        rate.update(2000);
        assert_eq!(rate.rate(), Some(60.0));
    }
}
