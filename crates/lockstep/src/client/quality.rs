use crate::log_target::LogTarget;
use crate::stats::MovingAverage;

use super::state::DisconnectReason;

const MAX_TICKS_WITHOUT_DATAGRAMS: usize = 40;
const MAX_TICKS_WITHOUT_STEPS: usize = 15;
const TICKS_WITHOUT_DEGRADE_THRESHOLD: usize = 10;
const MAX_DROPPED_DATAGRAMS: usize = 10;
const DROPPED_DATAGRAMS_THRESHOLD: usize = 1;
const MAX_LATENCY_MS: usize = 250;
const LATENCY_THRESHOLD_MS: usize = 60;
const JITTER_THRESHOLD_MS: i32 = 3;
const JITTER_DEGRADE: f32 = 0.9;
const GIVE_UP_AFTER_DEGRADED_TICKS: usize = 60;
const STILL_CONSIDERING_LOG_INTERVAL: usize = 20;
const RATING_SCALE: f32 = 5.0;

/// 1.0 below `lower_threshold`, 0.0 above `upper_bound`, linear in between.
fn degrade_low_is_better(value: usize, upper_bound: usize, lower_threshold: usize) -> f32 {
    if value < lower_threshold {
        return 1.0;
    }
    if value > upper_bound {
        return 0.0;
    }
    1.0 - (value - lower_threshold) as f32 / (upper_bound - lower_threshold) as f32
}

#[derive(Debug)]
pub struct ConnectionQuality {
    log: LogTarget,
    latency_ms: MovingAverage,
    rating_average: MovingAverage,
    last_latency_ms: i32,
    ticks_without_datagrams: usize,
    ticks_without_steps: usize,
    dropped_datagrams: usize,
    considering_disconnect: usize,
    rating: u8,
    last_reading: DisconnectReason,
    reason: DisconnectReason,
}

impl ConnectionQuality {
    pub fn new(log: LogTarget) -> Self {
        Self {
            log,
            latency_ms: MovingAverage::new(3),
            rating_average: MovingAverage::new(10),
            last_latency_ms: 0,
            ticks_without_datagrams: 0,
            ticks_without_steps: 0,
            dropped_datagrams: 0,
            considering_disconnect: 0,
            rating: 0,
            last_reading: DisconnectReason::KeepConnection,
            reason: DisconnectReason::KeepConnection,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.log.clone());
    }

    /// Advances one synced tick and re-evaluates the link.
    pub fn tick(&mut self) {
        self.ticks_without_datagrams += 1;
        self.ticks_without_steps += 1;
        self.dropped_datagrams = self.dropped_datagrams.saturating_sub(1);

        let reading = self.evaluate();
        self.last_reading = reading;

        if reading == DisconnectReason::KeepConnection {
            if self.considering_disconnect > 0 {
                self.considering_disconnect -= 1;
                if self.considering_disconnect == 0 {
                    log::info!(target: self.log.as_str(), "quality problems are forgiven");
                }
            }
            return;
        }

        self.considering_disconnect += 1;

        if self.considering_disconnect == 1 {
            log::warn!(target: self.log.as_str(), "noticed quality degradation: {}", self.describe());
        } else if self.considering_disconnect % STILL_CONSIDERING_LOG_INTERVAL == 0 {
            log::warn!(target: self.log.as_str(), "still considering disconnect: {}", self.describe());
        }

        if self.considering_disconnect > GIVE_UP_AFTER_DEGRADED_TICKS
            && self.reason == DisconnectReason::KeepConnection
        {
            self.reason = reading;
            log::warn!(target: self.log.as_str(), "giving up on connection: {}", self.describe());
        }
    }

    fn evaluate(&mut self) -> DisconnectReason {
        let datagrams_degrade = degrade_low_is_better(
            self.ticks_without_datagrams,
            MAX_TICKS_WITHOUT_DATAGRAMS,
            TICKS_WITHOUT_DEGRADE_THRESHOLD,
        );
        let steps_degrade = degrade_low_is_better(
            self.ticks_without_steps,
            MAX_TICKS_WITHOUT_STEPS,
            TICKS_WITHOUT_DEGRADE_THRESHOLD,
        );
        let dropped_degrade = degrade_low_is_better(
            self.dropped_datagrams,
            MAX_DROPPED_DATAGRAMS,
            DROPPED_DATAGRAMS_THRESHOLD,
        );

        let mut latency_degrade = 1.0;
        let mut jitter_degrade = 1.0;
        if let Some(latency) = self.latency_ms.average() {
            if (latency - self.last_latency_ms).abs() > JITTER_THRESHOLD_MS {
                jitter_degrade = JITTER_DEGRADE;
            }
            self.last_latency_ms = latency;
            latency_degrade =
                degrade_low_is_better(latency.max(0) as usize, MAX_LATENCY_MS, LATENCY_THRESHOLD_MS);
        }

        let total =
            datagrams_degrade * steps_degrade * dropped_degrade * latency_degrade * jitter_degrade;
        self.rating = (total * RATING_SCALE).round() as u8;
        self.rating_average.add(self.rating as i32);

        if self.ticks_without_datagrams >= MAX_TICKS_WITHOUT_DATAGRAMS {
            DisconnectReason::NotReceivingDatagramsFromServer
        } else if self.ticks_without_steps > MAX_TICKS_WITHOUT_STEPS {
            DisconnectReason::NotReceivingStepsFromServer
        } else {
            DisconnectReason::KeepConnection
        }
    }

    pub fn describe(&self) -> String {
        match self.last_reading {
            DisconnectReason::KeepConnection => format!("all good, rating {}", self.rating),
            DisconnectReason::NotReceivingStepsFromServer => format!(
                "{} ticks since last authoritative step, rating {}",
                self.ticks_without_steps, self.rating
            ),
            DisconnectReason::NotReceivingDatagramsFromServer => format!(
                "{} ticks since last valid datagram, rating {}",
                self.ticks_without_datagrams, self.rating
            ),
        }
    }

    pub fn dropped_datagrams(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.dropped_datagrams += count;
        log::debug!(target: self.log.as_str(), "dropped {} datagram(s)", count);
    }

    pub fn received_usable_datagram(&mut self) {
        self.ticks_without_datagrams = 0;
    }

    pub fn received_authoritative_steps(&mut self, count: usize) {
        if count > 0 {
            self.ticks_without_steps = 0;
        }
    }

    pub fn game_step_latency(&mut self, latency_ms: u64) {
        self.latency_ms.add(latency_ms.min(i32::MAX as u64) as i32);
    }

    pub fn should_disconnect(&self) -> bool {
        self.reason != DisconnectReason::KeepConnection
    }

    pub fn disconnect_reason(&self) -> DisconnectReason {
        self.reason
    }

    pub fn rating(&self) -> u8 {
        self.rating
    }

    pub fn rating_average(&self) -> Option<i32> {
        self.rating_average.average()
    }

    pub fn latency_average(&self) -> Option<i32> {
        self.latency_ms.average()
    }

    pub fn considering_disconnect(&self) -> usize {
        self.considering_disconnect
    }

    pub fn ticks_without_datagrams(&self) -> usize {
        self.ticks_without_datagrams
    }

    pub fn ticks_without_steps(&self) -> usize {
        self.ticks_without_steps
    }

    pub fn dropped_datagram_count(&self) -> usize {
        self.dropped_datagrams
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_tick(quality: &mut ConnectionQuality) {
        quality.received_usable_datagram();
        quality.received_authoritative_steps(1);
        quality.tick();
    }

    /// Ticks without steps until the reading turns degraded; returns once `degraded` such ticks passed.
    fn degraded_ticks(quality: &mut ConnectionQuality, degraded: usize) {
        quality.received_usable_datagram();
        quality.received_authoritative_steps(1);
        for _ in 0..MAX_TICKS_WITHOUT_STEPS {
            quality.received_usable_datagram();
            quality.tick();
        }
        assert_eq!(quality.considering_disconnect(), 0);
        for _ in 0..degraded {
            quality.received_usable_datagram();
            quality.tick();
        }
    }

    #[test]
    fn test_degrade_shape() {
        assert_eq!(degrade_low_is_better(5, 40, 10), 1.0);
        assert_eq!(degrade_low_is_better(10, 40, 10), 1.0);
        assert_eq!(degrade_low_is_better(25, 40, 10), 0.5);
        assert_eq!(degrade_low_is_better(40, 40, 10), 0.0);
        assert_eq!(degrade_low_is_better(41, 40, 10), 0.0);
    }

    #[test]
    fn test_healthy_link_has_full_rating() {
        let mut quality = ConnectionQuality::new(LogTarget::default());
        for _ in 0..5 {
            healthy_tick(&mut quality);
        }
        assert_eq!(quality.rating(), 5);
        assert!(!quality.should_disconnect());
    }

    #[test]
    fn test_59_degraded_ticks_are_forgiven() {
        let mut quality = ConnectionQuality::new(LogTarget::default());
        degraded_ticks(&mut quality, 59);
        assert_eq!(quality.considering_disconnect(), 59);

        healthy_tick(&mut quality);
        assert_eq!(quality.considering_disconnect(), 58);
        assert_eq!(
            quality.disconnect_reason(),
            DisconnectReason::KeepConnection
        );
        assert!(!quality.should_disconnect());
    }

    #[test]
    fn test_61_degraded_ticks_latch() {
        let mut quality = ConnectionQuality::new(LogTarget::default());
        degraded_ticks(&mut quality, 61);
        assert_eq!(
            quality.disconnect_reason(),
            DisconnectReason::NotReceivingStepsFromServer
        );

        for _ in 0..100 {
            healthy_tick(&mut quality);
        }
        assert_eq!(quality.considering_disconnect(), 0);
        assert!(quality.should_disconnect());
        assert_eq!(
            quality.disconnect_reason(),
            DisconnectReason::NotReceivingStepsFromServer
        );

        quality.reset();
        assert!(!quality.should_disconnect());
    }

    #[test]
    fn test_silence_reads_as_no_datagrams() {
        let mut quality = ConnectionQuality::new(LogTarget::default());
        for _ in 0..MAX_TICKS_WITHOUT_DATAGRAMS {
            quality.received_authoritative_steps(1);
            quality.tick();
        }
        assert_eq!(
            quality.last_reading,
            DisconnectReason::NotReceivingDatagramsFromServer
        );
        assert_eq!(quality.rating(), 0);
    }

    #[test]
    fn test_dropped_datagrams_decay() {
        let mut quality = ConnectionQuality::new(LogTarget::default());
        quality.dropped_datagrams(4);
        healthy_tick(&mut quality);
        assert_eq!(quality.dropped_datagram_count(), 3);
        for _ in 0..10 {
            healthy_tick(&mut quality);
        }
        assert_eq!(quality.dropped_datagram_count(), 0);
    }

    #[test]
    fn test_latency_and_jitter_degrade() {
        let mut quality = ConnectionQuality::new(LogTarget::default());
        for _ in 0..3 {
            quality.game_step_latency(155);
        }
        healthy_tick(&mut quality);
        // 155 ms sits halfway between 60 and 250 and jumped from 0, so 0.5 * 0.9.
        assert_eq!(quality.rating(), 2);

        healthy_tick(&mut quality);
        assert_eq!(quality.rating(), 3);
    }
}
