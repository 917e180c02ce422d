use std::collections::VecDeque;

use super::buffer::StepBuffer;
use super::{StepError, StepId};

pub const RECEIVE_MASK_BITS: usize = 64;
const WINDOW: usize = RECEIVE_MASK_BITS + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingReceive {
    Stored,
    Duplicate,
    OutOfWindow,
}

/// Authoritative step fragments that may arrive out of order, keyed from `expected_id`.
#[derive(Debug)]
pub struct PendingSteps {
    expected_id: StepId,
    slots: VecDeque<Option<Vec<u8>>>,
}

impl PendingSteps {
    pub fn new(expected_id: StepId) -> Self {
        Self {
            expected_id,
            slots: (0..WINDOW).map(|_| None).collect(),
        }
    }

    pub fn reset(&mut self, expected_id: StepId) {
        self.expected_id = expected_id;
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    pub fn expected_id(&self) -> StepId {
        self.expected_id
    }

    pub fn stored_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn receive(&mut self, id: StepId, payload: &[u8]) -> PendingReceive {
        if id < self.expected_id {
            return PendingReceive::Duplicate;
        }
        let offset = (id - self.expected_id) as usize;
        let Some(slot) = self.slots.get_mut(offset) else {
            return PendingReceive::OutOfWindow;
        };
        if slot.is_some() {
            return PendingReceive::Duplicate;
        }
        *slot = Some(payload.to_vec());
        PendingReceive::Stored
    }

    /// Bit `i` is set when `expected_id + 1 + i` has been received.
    pub fn receive_mask(&self) -> (StepId, u64) {
        let mut mask = 0u64;
        for (bit, slot) in self.slots.iter().skip(1).enumerate() {
            if slot.is_some() {
                mask |= 1u64 << bit;
            }
        }
        (self.expected_id, mask)
    }

    /// Moves the completed run at the front of the window into `target`.
    /// Stops early when `target` is full; the rest stays pending.
    pub fn copy_completed_into(&mut self, target: &mut StepBuffer) -> Result<usize, StepError> {
        if target.expected_write_id() != self.expected_id {
            return Err(StepError::OutOfOrder {
                expected: target.expected_write_id(),
                got: self.expected_id,
            });
        }

        let mut copied = 0;
        while self.slots.front().is_some_and(Option::is_some) && !target.is_full() {
            if let Some(Some(payload)) = self.slots.pop_front() {
                target.write(self.expected_id, &payload)?;
            }
            self.slots.push_back(None);
            self.expected_id = self.expected_id.wrapping_add(1);
            copied += 1;
        }

        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_order_fragments_wait_for_gap() {
        let mut pending = PendingSteps::new(10);
        let mut combined = StepBuffer::new(10, 64);

        assert_eq!(pending.receive(11, b"b"), PendingReceive::Stored);
        assert_eq!(pending.receive(12, b"c"), PendingReceive::Stored);
        assert_eq!(pending.copy_completed_into(&mut combined).unwrap(), 0);
        assert_eq!(pending.receive_mask(), (10, 0b11));

        assert_eq!(pending.receive(10, b"a"), PendingReceive::Stored);
        assert_eq!(pending.copy_completed_into(&mut combined).unwrap(), 3);
        assert_eq!(pending.receive_mask(), (13, 0));

        let ids: Vec<StepId> = std::iter::from_fn(|| combined.read()).map(|s| s.id).collect();
        assert_eq!(ids, vec![10, 11, 12]);
    }

    #[test]
    fn test_duplicates_and_window_edges() {
        let mut pending = PendingSteps::new(100);
        let mut combined = StepBuffer::new(100, 64);

        assert_eq!(pending.receive(100, b"first"), PendingReceive::Stored);
        assert_eq!(pending.receive(100, b"again"), PendingReceive::Duplicate);
        pending.copy_completed_into(&mut combined).unwrap();
        assert_eq!(pending.receive(100, b"late"), PendingReceive::Duplicate);

        let last_in_window = 101 + RECEIVE_MASK_BITS as StepId;
        assert_eq!(pending.receive(last_in_window, b"edge"), PendingReceive::Stored);
        assert_eq!(
            pending.receive(last_in_window + 1, b"far"),
            PendingReceive::OutOfWindow
        );
        assert_eq!(pending.receive_mask(), (101, 1 << 63));

        assert_eq!(combined.read().unwrap().payload, b"first");
        assert!(combined.read().is_none());
    }

    #[test]
    fn test_full_target_keeps_rest_pending() {
        let mut pending = PendingSteps::new(0);
        let mut combined = StepBuffer::new(0, 2);
        for id in 0..4u32 {
            pending.receive(id, &[id as u8]);
        }

        assert_eq!(pending.copy_completed_into(&mut combined).unwrap(), 2);
        assert_eq!(pending.expected_id(), 2);
        assert_eq!(pending.stored_count(), 2);

        combined.read();
        combined.read();
        assert_eq!(pending.copy_completed_into(&mut combined).unwrap(), 2);
        assert_eq!(combined.read().unwrap().payload, vec![2]);
    }

    #[test]
    fn test_desynced_target_is_rejected() {
        let mut pending = PendingSteps::new(5);
        let mut combined = StepBuffer::new(6, 8);
        pending.receive(5, b"x");
        assert!(pending.copy_completed_into(&mut combined).is_err());
    }
}
