use std::collections::VecDeque;

use crate::net::{
    MAX_REDUNDANCY_COUNT, MAX_STEPS_PER_DATAGRAM, OutStream, StreamError, write_step_run,
};
use crate::steps::{PendingSteps, StepBuffer, StepId};

const MIN_BUFFER_DELTA: i32 = 2;
const MAX_EXTRA_BUFFER_TICKS: i32 = 5;
/// Step count and first step id ahead of the payloads.
const STEP_RUN_HEADER: usize = 1 + 4;
const STEP_LENGTH_PREFIX: usize = 2;

/// How many ticks ahead of the last authoritative step local prediction should run.
///
/// `None` until a latency average exists. A missing buffer delta average adds nothing.
pub fn optimal_prediction_tick_count(
    latency_average_ms: Option<i32>,
    buffer_delta_average: Option<i32>,
    expected_tick_duration_ms: u64,
) -> Option<usize> {
    let latency_ms = latency_average_ms?.max(0) as u64;
    let mut ticks = latency_ms.div_ceil(expected_tick_duration_ms.max(1)) as usize + 1;

    if let Some(delta) = buffer_delta_average {
        if delta < MIN_BUFFER_DELTA {
            ticks += (MIN_BUFFER_DELTA - delta).min(MAX_EXTRA_BUFFER_TICKS) as usize;
        }
    }

    Some(ticks)
}

/// Redundant transmission of predicted steps.
///
/// Every predicted step is sent in up to `MAX_REDUNDANCY_COUNT` consecutive datagrams;
/// `cursor` is the first step that has not reached that count yet.
#[derive(Debug)]
pub struct StepExchange {
    cursor: StepId,
    send_counts: VecDeque<u8>,
    last_run: usize,
}

impl StepExchange {
    pub fn new(first_id: StepId) -> Self {
        Self {
            cursor: first_id,
            send_counts: VecDeque::with_capacity(MAX_STEPS_PER_DATAGRAM),
            last_run: 0,
        }
    }

    pub fn reset(&mut self, first_id: StepId) {
        self.cursor = first_id;
        self.send_counts.clear();
        self.last_run = 0;
    }

    pub fn cursor(&self) -> StepId {
        self.cursor
    }

    /// Tells the server which authoritative step is expected next and which of the following ones are here.
    pub fn write_ack(pending: &PendingSteps, stream: &mut OutStream) -> Result<(), StreamError> {
        let (expected_id, mask) = pending.receive_mask();
        stream.write_u32(expected_id)?;
        stream.write_u64(mask)
    }

    /// Writes the run starting at the cursor, as many steps as fit. Returns the step count written.
    pub fn write_steps(
        &mut self,
        predicted: &StepBuffer,
        stream: &mut OutStream,
    ) -> Result<usize, StreamError> {
        self.skip_discarded(predicted.expected_read_id());

        let mut budget = stream.remaining().saturating_sub(STEP_RUN_HEADER);
        let mut payloads = Vec::with_capacity(MAX_STEPS_PER_DATAGRAM);
        for step in predicted.iter_from(self.cursor).take(MAX_STEPS_PER_DATAGRAM) {
            let needed = STEP_LENGTH_PREFIX + step.payload.len();
            if needed > budget {
                break;
            }
            budget -= needed;
            payloads.push(step.payload.as_slice());
        }

        self.last_run = payloads.len();
        write_step_run(stream, self.cursor, payloads.into_iter())?;

        Ok(self.last_run)
    }

    /// Counts the last written run as sent and moves the cursor past fully redundant steps.
    pub fn commit_sent(&mut self) {
        for index in 0..self.last_run {
            if self.send_counts.len() <= index {
                self.send_counts.push_back(0);
            }
            self.send_counts[index] = self.send_counts[index].saturating_add(1);
        }
        self.last_run = 0;

        while self
            .send_counts
            .front()
            .is_some_and(|&count| count as usize >= MAX_REDUNDANCY_COUNT)
        {
            self.send_counts.pop_front();
            self.cursor = self.cursor.wrapping_add(1);
        }
    }

    /// Predicted steps not yet sent to the server at all.
    pub fn queue_depth(predicted: &StepBuffer) -> usize {
        predicted.len().saturating_sub(MAX_REDUNDANCY_COUNT)
    }

    fn skip_discarded(&mut self, first_available: StepId) {
        while self.cursor < first_available {
            self.send_counts.pop_front();
            self.cursor = self.cursor.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{InStream, read_step_run};

    fn predicted(first: StepId, count: u32) -> StepBuffer {
        let mut buffer = StepBuffer::new(first, 64);
        for id in first..first + count {
            buffer.write(id, &[id as u8; 4]).unwrap();
        }
        buffer
    }

    fn sent_ids(exchange: &mut StepExchange, buffer: &StepBuffer) -> Vec<StepId> {
        let mut stream = OutStream::with_capacity(1200);
        exchange.write_steps(buffer, &mut stream).unwrap();
        exchange.commit_sent();
        let octets = stream.into_octets();
        let mut reader = InStream::new(&octets);
        read_step_run(&mut reader)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    #[test]
    fn test_prediction_ticks_from_latency() {
        assert_eq!(optimal_prediction_tick_count(Some(100), None, 16), Some(8));
        assert_eq!(optimal_prediction_tick_count(Some(100), Some(0), 16), Some(10));
        assert_eq!(optimal_prediction_tick_count(Some(100), Some(2), 16), Some(8));
        assert_eq!(optimal_prediction_tick_count(Some(100), Some(-20), 16), Some(13));
        assert_eq!(optimal_prediction_tick_count(Some(0), None, 16), Some(1));
        assert_eq!(optimal_prediction_tick_count(None, Some(0), 16), None);
    }

    #[test]
    fn test_each_step_is_sent_redundantly() {
        let mut exchange = StepExchange::new(10);
        let mut buffer = predicted(10, 1);

        assert_eq!(sent_ids(&mut exchange, &buffer), vec![10]);
        buffer.write(11, b"b").unwrap();
        assert_eq!(sent_ids(&mut exchange, &buffer), vec![10, 11]);
        buffer.write(12, b"c").unwrap();
        assert_eq!(sent_ids(&mut exchange, &buffer), vec![10, 11, 12]);
        assert_eq!(exchange.cursor(), 11);

        buffer.write(13, b"d").unwrap();
        assert_eq!(sent_ids(&mut exchange, &buffer), vec![11, 12, 13]);
        assert_eq!(exchange.cursor(), 12);
    }

    #[test]
    fn test_uncommitted_run_is_not_counted() {
        let mut exchange = StepExchange::new(0);
        let buffer = predicted(0, 2);

        for _ in 0..5 {
            let mut stream = OutStream::with_capacity(1200);
            exchange.write_steps(&buffer, &mut stream).unwrap();
        }
        assert_eq!(exchange.cursor(), 0);
        assert_eq!(sent_ids(&mut exchange, &buffer), vec![0, 1]);
    }

    #[test]
    fn test_cursor_follows_discard() {
        let mut exchange = StepExchange::new(0);
        let mut buffer = predicted(0, 6);
        assert_eq!(sent_ids(&mut exchange, &buffer), vec![0, 1, 2, 3, 4, 5]);

        buffer.discard_up_to(4);
        assert_eq!(sent_ids(&mut exchange, &buffer), vec![4, 5]);
        assert_eq!(exchange.cursor(), 4);
    }

    #[test]
    fn test_run_is_capped() {
        let mut exchange = StepExchange::new(0);
        let buffer = predicted(0, 40);
        assert_eq!(sent_ids(&mut exchange, &buffer).len(), MAX_STEPS_PER_DATAGRAM);

        let mut small = OutStream::with_capacity(STEP_RUN_HEADER + 2 * (STEP_LENGTH_PREFIX + 4));
        assert_eq!(exchange.write_steps(&buffer, &mut small).unwrap(), 2);
    }

    #[test]
    fn test_queue_depth_excludes_redundancy_window() {
        assert_eq!(StepExchange::queue_depth(&predicted(0, 2)), 0);
        assert_eq!(StepExchange::queue_depth(&predicted(0, 7)), 4);
    }
}
