use crate::net::BlobStreamIn;
use crate::steps::StepId;

/// Game state downloaded on join, captured at `step_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStateSnapshot {
    pub step_id: StepId,
    pub octets: Vec<u8>,
}

/// Download in progress on one blob channel.
#[derive(Debug)]
pub(super) struct StateDownload {
    pub channel: u16,
    pub step_id: StepId,
    pub blob: BlobStreamIn,
}

impl StateDownload {
    pub fn new(channel: u16, step_id: StepId, octet_count: usize) -> Self {
        Self {
            channel,
            step_id,
            blob: BlobStreamIn::new(octet_count),
        }
    }

    pub fn snapshot(&self) -> Option<GameStateSnapshot> {
        self.blob.blob().map(|octets| GameStateSnapshot {
            step_id: self.step_id,
            octets: octets.to_vec(),
        })
    }
}
