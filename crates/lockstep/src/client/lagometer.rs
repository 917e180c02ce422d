use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

const LAGOMETER_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LagometerStatus {
    Received,
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LagometerSample {
    pub status: LagometerStatus,
    pub latency_ms: Option<u64>,
    pub octet_count: usize,
}

/// Most recent datagram outcomes, oldest first. Meant for on-screen lag graphs.
#[derive(Debug, Clone)]
pub struct Lagometer {
    samples: VecDeque<LagometerSample>,
    capacity: usize,
}

impl Default for Lagometer {
    fn default() -> Self {
        Self::new(LAGOMETER_CAPACITY)
    }
}

impl Lagometer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, sample: LagometerSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn received(&mut self, latency_ms: Option<u64>, octet_count: usize) {
        self.push(LagometerSample {
            status: LagometerStatus::Received,
            latency_ms,
            octet_count,
        });
    }

    /// Only the last `capacity` losses are kept, however many were reported.
    pub fn dropped(&mut self, count: usize) {
        for _ in 0..count.min(self.capacity) {
            self.push(LagometerSample {
                status: LagometerStatus::Dropped,
                latency_ms: None,
                octet_count: 0,
            });
        }
    }

    pub fn samples(&self) -> impl Iterator<Item = &LagometerSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oldest_samples_fall_out() {
        let mut lagometer = Lagometer::new(3);
        for octets in 1..=5 {
            lagometer.received(Some(20), octets);
        }
        let sizes: Vec<usize> = lagometer.samples().map(|s| s.octet_count).collect();
        assert_eq!(sizes, vec![3, 4, 5]);
    }

    #[test]
    fn test_large_loss_is_capped() {
        let mut lagometer = Lagometer::new(4);
        lagometer.received(None, 10);
        lagometer.dropped(1000);
        assert_eq!(lagometer.len(), 4);
        assert!(
            lagometer
                .samples()
                .all(|s| s.status == LagometerStatus::Dropped)
        );

        lagometer.clear();
        assert!(lagometer.is_empty());
    }
}
