use super::stream::{InStream, OutStream, StreamError};

pub const BLOB_CHUNK_SIZE: usize = 1024;
const ACK_MASK_BITS: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlobError {
    #[error("chunk {index} is outside blob of {chunk_count} chunks")]
    ChunkOutOfRange { index: u32, chunk_count: u32 },
    #[error("chunk {index} carries {got} octets, expected {expected}")]
    ChunkSize {
        index: u32,
        got: usize,
        expected: usize,
    },
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Reassembles a blob from fixed-size chunks that may arrive in any order.
#[derive(Debug)]
pub struct BlobStreamIn {
    blob: Vec<u8>,
    received: Vec<bool>,
    received_count: usize,
}

impl BlobStreamIn {
    pub fn new(octet_count: usize) -> Self {
        let chunk_count = octet_count.div_ceil(BLOB_CHUNK_SIZE);
        Self {
            blob: vec![0u8; octet_count],
            received: vec![false; chunk_count],
            received_count: 0,
        }
    }

    pub fn octet_count(&self) -> usize {
        self.blob.len()
    }

    pub fn chunk_count(&self) -> u32 {
        self.received.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.received_count == self.received.len()
    }

    pub fn blob(&self) -> Option<&[u8]> {
        self.is_complete().then_some(self.blob.as_slice())
    }

    pub fn into_blob(self) -> Option<Vec<u8>> {
        self.is_complete().then_some(self.blob)
    }

    fn chunk_len(&self, index: usize) -> usize {
        let start = index * BLOB_CHUNK_SIZE;
        BLOB_CHUNK_SIZE.min(self.blob.len() - start)
    }

    pub fn receive(&mut self, stream: &mut InStream) -> Result<(), BlobError> {
        let index = stream.read_u32()?;
        let octet_count = stream.read_u16()? as usize;
        let octets = stream.read_octets(octet_count)?;

        if index >= self.chunk_count() {
            return Err(BlobError::ChunkOutOfRange {
                index,
                chunk_count: self.chunk_count(),
            });
        }

        let slot = index as usize;
        let expected = self.chunk_len(slot);
        if octet_count != expected {
            return Err(BlobError::ChunkSize {
                index,
                got: octet_count,
                expected,
            });
        }

        if self.received[slot] {
            log::trace!("blob chunk {} already received", index);
            return Ok(());
        }

        let start = slot * BLOB_CHUNK_SIZE;
        self.blob[start..start + octet_count].copy_from_slice(octets);
        self.received[slot] = true;
        self.received_count += 1;

        Ok(())
    }

    /// First missing chunk index and a mask of which of the following chunks are already here.
    pub fn ack(&self) -> (u32, u64) {
        let waiting_for = self
            .received
            .iter()
            .position(|received| !received)
            .unwrap_or(self.received.len()) as u32;

        let mut mask = 0u64;
        for bit in 0..ACK_MASK_BITS {
            let index = (waiting_for + 1 + bit) as usize;
            if self.received.get(index).copied().unwrap_or(false) {
                mask |= 1u64 << bit;
            }
        }

        (waiting_for, mask)
    }

    pub fn write_ack(&self, stream: &mut OutStream) -> Result<(), StreamError> {
        let (waiting_for, mask) = self.ack();
        stream.write_u32(waiting_for)?;
        stream.write_u64(mask)
    }
}

/// Encodes a single chunk the way [`BlobStreamIn::receive`] expects it.
pub fn write_chunk(stream: &mut OutStream, index: u32, octets: &[u8]) -> Result<(), StreamError> {
    stream.write_u32(index)?;
    stream.write_u16(octets.len() as u16)?;
    stream.write_octets(octets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: u32, octets: &[u8]) -> Vec<u8> {
        let mut out = OutStream::with_capacity(BLOB_CHUNK_SIZE + 16);
        write_chunk(&mut out, index, octets).unwrap();
        out.into_octets()
    }

    #[test]
    fn test_out_of_order_assembly() {
        let source: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        let mut blob = BlobStreamIn::new(source.len());
        assert_eq!(blob.chunk_count(), 3);

        for index in [2u32, 0, 1] {
            let start = index as usize * BLOB_CHUNK_SIZE;
            let end = (start + BLOB_CHUNK_SIZE).min(source.len());
            let data = chunk(index, &source[start..end]);
            assert!(!blob.is_complete());
            blob.receive(&mut InStream::new(&data)).unwrap();
        }

        assert!(blob.is_complete());
        assert_eq!(blob.blob().unwrap(), source.as_slice());
    }

    #[test]
    fn test_ack_reports_gap() {
        let mut blob = BlobStreamIn::new(BLOB_CHUNK_SIZE * 4);
        let payload = vec![1u8; BLOB_CHUNK_SIZE];
        for index in [0u32, 2, 3] {
            blob.receive(&mut InStream::new(&chunk(index, &payload)))
                .unwrap();
        }

        assert_eq!(blob.ack(), (1, 0b11));
    }

    #[test]
    fn test_rejects_bad_chunks() {
        let mut blob = BlobStreamIn::new(10);
        let too_far = chunk(1, &[0u8; 10]);
        assert!(matches!(
            blob.receive(&mut InStream::new(&too_far)),
            Err(BlobError::ChunkOutOfRange { index: 1, .. })
        ));

        let wrong_size = chunk(0, &[0u8; 4]);
        assert!(matches!(
            blob.receive(&mut InStream::new(&wrong_size)),
            Err(BlobError::ChunkSize { expected: 10, .. })
        ));
        assert!(!blob.is_complete());
    }

    #[test]
    fn test_empty_blob_is_complete() {
        let blob = BlobStreamIn::new(0);
        assert!(blob.is_complete());
        assert_eq!(blob.into_blob(), Some(Vec::new()));
    }
}
