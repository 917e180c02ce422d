use super::stream::{InStream, OutStream, StreamError};

#[derive(Debug, Default)]
pub struct OrderedDatagramOut {
    sequence: u16,
}

impl OrderedDatagramOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn prepare(&self, stream: &mut OutStream) -> Result<(), StreamError> {
        stream.write_u16(self.sequence)
    }

    /// Only call once the prepared datagram has been handed to the transport.
    pub fn commit(&mut self) {
        self.sequence = self.sequence.wrapping_add(1);
    }
}

#[derive(Debug, Default)]
pub struct OrderedDatagramIn {
    last_received: Option<u16>,
}

impl OrderedDatagramIn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_received(&self) -> Option<u16> {
        self.last_received
    }

    /// Reads the sequence and returns the distance from the last accepted one.
    ///
    /// `<= 0` is a duplicate or reordered datagram and leaves the state untouched,
    /// `1` is in order and `n > 1` means `n - 1` datagrams went missing.
    pub fn receive(&mut self, stream: &mut InStream) -> Result<i32, StreamError> {
        let sequence = stream.read_u16()?;
        let delta = match self.last_received {
            None => 1,
            Some(last) => sequence.wrapping_sub(last) as i16 as i32,
        };
        if delta > 0 {
            self.last_received = Some(sequence);
        }
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(logic: &mut OrderedDatagramIn, sequence: u16) -> i32 {
        let octets = sequence.to_le_bytes();
        logic.receive(&mut InStream::new(&octets)).unwrap()
    }

    #[test]
    fn test_first_datagram_is_in_order() {
        let mut logic = OrderedDatagramIn::new();
        assert_eq!(feed(&mut logic, 500), 1);
        assert_eq!(feed(&mut logic, 501), 1);
    }

    #[test]
    fn test_duplicate_and_reordered_are_rejected() {
        let mut logic = OrderedDatagramIn::new();
        feed(&mut logic, 10);
        assert_eq!(feed(&mut logic, 10), 0);
        assert!(feed(&mut logic, 9) < 0);
        assert_eq!(logic.last_received(), Some(10));
        assert_eq!(feed(&mut logic, 11), 1);
    }

    #[test]
    fn test_gap_reports_dropped_count() {
        let mut logic = OrderedDatagramIn::new();
        feed(&mut logic, 1);
        assert_eq!(feed(&mut logic, 5), 4);
    }

    #[test]
    fn test_sequence_wraps() {
        let mut logic = OrderedDatagramIn::new();
        feed(&mut logic, u16::MAX);
        assert_eq!(feed(&mut logic, 0), 1);
        assert!(feed(&mut logic, u16::MAX) < 0);
    }

    #[test]
    fn test_accepted_deltas_are_positive() {
        let mut logic = OrderedDatagramIn::new();
        let sequences = [3u16, 3, 2, 4, 9, 8, 9, 10, 40000, 39999, 40001];
        let mut last_accepted: Option<u16> = None;
        for sequence in sequences {
            let delta = feed(&mut logic, sequence);
            if delta >= 1 {
                last_accepted = Some(sequence);
            }
            assert_eq!(logic.last_received(), last_accepted);
        }
    }

    #[test]
    fn test_commit_advances_sequence() {
        let mut out = OrderedDatagramOut::new();
        let mut stream = OutStream::with_capacity(4);
        out.prepare(&mut stream).unwrap();
        assert_eq!(out.sequence(), 0);
        out.commit();
        out.prepare(&mut stream).unwrap();
        assert_eq!(stream.octets(), &[0, 0, 1, 0]);
    }
}
