use std::collections::VecDeque;

use super::{StepError, StepId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub id: StepId,
    pub payload: Vec<u8>,
}

/// Ordered, gap-free run of steps. Writes must arrive at `expected_write_id`.
#[derive(Debug)]
pub struct StepBuffer {
    steps: VecDeque<Step>,
    expected_write_id: StepId,
    capacity: usize,
}

impl StepBuffer {
    pub fn new(first_id: StepId, capacity: usize) -> Self {
        Self {
            steps: VecDeque::with_capacity(capacity),
            expected_write_id: first_id,
            capacity,
        }
    }

    /// Drops every step and restarts the sequence at `first_id`.
    pub fn reinit(&mut self, first_id: StepId) {
        self.steps.clear();
        self.expected_write_id = first_id;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.steps.len() >= self.capacity
    }

    pub fn expected_write_id(&self) -> StepId {
        self.expected_write_id
    }

    pub fn expected_read_id(&self) -> StepId {
        self.steps
            .front()
            .map_or(self.expected_write_id, |step| step.id)
    }

    pub fn write(&mut self, id: StepId, payload: &[u8]) -> Result<(), StepError> {
        if id != self.expected_write_id {
            return Err(StepError::OutOfOrder {
                expected: self.expected_write_id,
                got: id,
            });
        }
        if self.is_full() {
            return Err(StepError::Full {
                capacity: self.capacity,
            });
        }

        self.steps.push_back(Step {
            id,
            payload: payload.to_vec(),
        });
        self.expected_write_id = self.expected_write_id.wrapping_add(1);

        Ok(())
    }

    pub fn read(&mut self) -> Option<Step> {
        self.steps.pop_front()
    }

    pub fn get(&self, id: StepId) -> Option<&Step> {
        let first = self.steps.front()?.id;
        let offset = id.wrapping_sub(first) as usize;
        self.steps.get(offset).filter(|step| step.id == id)
    }

    /// Steps from `id` onward, in order. Empty if `id` is not in the buffer.
    pub fn iter_from(&self, id: StepId) -> impl Iterator<Item = &Step> {
        let skip = match self.steps.front() {
            Some(first) if self.get(id).is_some() => id.wrapping_sub(first.id) as usize,
            _ => self.steps.len(),
        };
        self.steps.iter().skip(skip)
    }

    /// Removes every step with an id lower than `id`.
    pub fn discard_up_to(&mut self, id: StepId) -> usize {
        let mut discarded = 0;
        while self.steps.front().is_some_and(|step| step.id < id) {
            self.steps.pop_front();
            discarded += 1;
        }
        discarded
    }
}
