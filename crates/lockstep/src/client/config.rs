use serde::{Deserialize, Serialize};

use crate::log_target::LogTarget;
use crate::net::{MAX_DATAGRAM_SIZE, MAX_LOCAL_PARTICIPANTS, MAX_REDUNDANCY_COUNT, Version};

/// Datagram header, game step command and ack window, and the step run header.
const STEP_DATAGRAM_OVERHEAD: usize = 1 + 4 + 2 + 2 + 1 + 4 + 8 + 1 + 4;
/// Length prefix of a single step.
const STEP_LENGTH_PREFIX: usize = 2;

pub const MAX_STEP_OCTETS: usize =
    (MAX_DATAGRAM_SIZE - STEP_DATAGRAM_OVERHEAD) / MAX_REDUNDANCY_COUNT - STEP_LENGTH_PREFIX;

const DEFAULT_MAX_SNAPSHOT_OCTETS: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub application_version: Version,
    pub max_participants: usize,
    pub max_single_participant_step_octets: usize,
    pub expected_tick_duration_ms: u64,
    pub tick_tolerance_ms: u64,
    pub max_predicted_steps: usize,
    /// Game state downloads announced larger than this are refused.
    pub max_snapshot_octets: usize,
    pub wants_debug_streams: bool,
    pub log_target: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            application_version: Version::default(),
            max_participants: MAX_LOCAL_PARTICIPANTS,
            max_single_participant_step_octets: 32,
            expected_tick_duration_ms: 16,
            tick_tolerance_ms: 4,
            max_predicted_steps: 64,
            max_snapshot_octets: DEFAULT_MAX_SNAPSHOT_OCTETS,
            wants_debug_streams: false,
            log_target: "lockstep".to_string(),
        }
    }
}

impl ClientConfig {
    /// Each step carries one payload per participant, prefixed by a participant id and length.
    pub fn max_step_octets(&self) -> usize {
        self.max_participants * (self.max_single_participant_step_octets + 2)
    }

    /// Clamps out-of-range values instead of refusing them.
    pub(crate) fn sanitized(mut self) -> Self {
        let target = LogTarget::new(&self.log_target);

        if self.max_participants == 0 || self.max_participants > MAX_LOCAL_PARTICIPANTS {
            log::warn!(
                target: target.as_str(),
                "max participants {} is out of range, using {}",
                self.max_participants,
                MAX_LOCAL_PARTICIPANTS
            );
            self.max_participants = MAX_LOCAL_PARTICIPANTS;
        }

        if self.max_step_octets() > MAX_STEP_OCTETS {
            let clamped = MAX_STEP_OCTETS / self.max_participants - 2;
            log::warn!(
                target: target.as_str(),
                "step of {} octets for {} participants can not fit a datagram, clamping participant payload to {}",
                self.max_single_participant_step_octets,
                self.max_participants,
                clamped
            );
            self.max_single_participant_step_octets = clamped;
        }

        if self.expected_tick_duration_ms == 0 {
            log::warn!(target: target.as_str(), "expected tick duration can not be zero, using 16 ms");
            self.expected_tick_duration_ms = 16;
        }

        if self.max_predicted_steps < MAX_REDUNDANCY_COUNT {
            log::warn!(
                target: target.as_str(),
                "predicted step capacity {} is below the redundancy window",
                self.max_predicted_steps
            );
            self.max_predicted_steps = MAX_REDUNDANCY_COUNT;
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_untouched() {
        let config = ClientConfig::default();
        assert_eq!(config.clone().sanitized(), config);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let config = ClientConfig {
            max_participants: 12,
            max_single_participant_step_octets: 4000,
            expected_tick_duration_ms: 0,
            max_predicted_steps: 1,
            ..Default::default()
        }
        .sanitized();

        assert_eq!(config.max_participants, MAX_LOCAL_PARTICIPANTS);
        assert!(config.max_step_octets() <= MAX_STEP_OCTETS);
        assert_eq!(config.expected_tick_duration_ms, 16);
        assert_eq!(config.max_predicted_steps, MAX_REDUNDANCY_COUNT);
    }
}
