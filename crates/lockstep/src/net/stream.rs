#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("read of {wanted} octets at {pos} overruns stream of {len}")]
    Underflow { pos: usize, wanted: usize, len: usize },
    #[error("write of {wanted} octets at {pos} overruns capacity {capacity}")]
    Overflow {
        pos: usize,
        wanted: usize,
        capacity: usize,
    },
    #[error("expected marker {expected:#04X}, found {found:#04X}")]
    Marker { expected: u8, found: u8 },
}

/// Read cursor over a received datagram.
#[derive(Debug)]
pub struct InStream<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> InStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_consumed(&self) -> bool {
        self.pos == self.data.len()
    }

    /// Octets after the cursor, without advancing.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn read_octets(&mut self, count: usize) -> Result<&'a [u8], StreamError> {
        if count > self.remaining() {
            return Err(StreamError::Underflow {
                pos: self.pos,
                wanted: count,
                len: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], StreamError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_octets(N)?);
        Ok(out)
    }

    pub fn peek_u8(&self) -> Result<u8, StreamError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(StreamError::Underflow {
                pos: self.pos,
                wanted: 1,
                len: self.data.len(),
            })
    }

    pub fn read_u8(&mut self) -> Result<u8, StreamError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, StreamError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, StreamError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, StreamError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, StreamError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn check_marker(&mut self, expected: u8) -> Result<(), StreamError> {
        let found = self.read_u8()?;
        if found != expected {
            return Err(StreamError::Marker { expected, found });
        }
        Ok(())
    }
}

/// Bounded write cursor that owns its octets.
#[derive(Debug, Clone)]
pub struct OutStream {
    octets: Vec<u8>,
    capacity: usize,
}

impl OutStream {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            octets: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn pos(&self) -> usize {
        self.octets.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.octets.len()
    }

    pub fn octets(&self) -> &[u8] {
        &self.octets
    }

    pub fn into_octets(self) -> Vec<u8> {
        self.octets
    }

    fn ensure(&self, wanted: usize) -> Result<(), StreamError> {
        if wanted > self.remaining() {
            return Err(StreamError::Overflow {
                pos: self.octets.len(),
                wanted,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    pub fn write_octets(&mut self, data: &[u8]) -> Result<(), StreamError> {
        self.ensure(data.len())?;
        self.octets.extend_from_slice(data);
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), StreamError> {
        self.write_octets(&[value])
    }

    pub fn write_i8(&mut self, value: i8) -> Result<(), StreamError> {
        self.write_u8(value as u8)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), StreamError> {
        self.write_octets(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), StreamError> {
        self.write_octets(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), StreamError> {
        self.write_octets(&value.to_le_bytes())
    }

    /// Reserves a u32 field to be filled in later with [`OutStream::patch_u32`].
    pub fn reserve_u32(&mut self) -> Result<usize, StreamError> {
        let at = self.pos();
        self.write_u32(0)?;
        Ok(at)
    }

    pub fn patch_u32(&mut self, at: usize, value: u32) -> Result<(), StreamError> {
        match self.octets.get_mut(at..at + 4) {
            Some(field) => {
                field.copy_from_slice(&value.to_le_bytes());
                Ok(())
            }
            None => Err(StreamError::Overflow {
                pos: at,
                wanted: 4,
                capacity: self.octets.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_past_end_is_rejected() {
        let data = [1u8, 2, 3];
        let mut stream = InStream::new(&data);

        assert_eq!(stream.read_u16().unwrap(), 0x0201);
        assert!(matches!(
            stream.read_u16(),
            Err(StreamError::Underflow { pos: 2, wanted: 2, len: 3 })
        ));
        assert_eq!(stream.read_u8().unwrap(), 3);
        assert!(stream.is_consumed());
    }

    #[test]
    fn test_write_respects_capacity() {
        let mut stream = OutStream::with_capacity(5);
        stream.write_u32(7).unwrap();
        assert!(stream.write_u16(1).is_err());
        stream.write_u8(9).unwrap();
        assert_eq!(stream.octets(), &[7, 0, 0, 0, 9]);
    }

    #[test]
    fn test_patch_reserved_field() {
        let mut stream = OutStream::with_capacity(16);
        stream.write_u8(0xAA).unwrap();
        let at = stream.reserve_u32().unwrap();
        stream.write_u8(0xBB).unwrap();
        stream.patch_u32(at, 0x0403_0201).unwrap();

        assert_eq!(stream.octets(), &[0xAA, 1, 2, 3, 4, 0xBB]);
        assert!(stream.patch_u32(4, 0).is_err());
    }

    #[test]
    fn test_marker_mismatch() {
        let data = [0xDD, 0xEE];
        let mut stream = InStream::new(&data);
        stream.check_marker(0xDD).unwrap();
        assert_eq!(
            stream.check_marker(0xDD),
            Err(StreamError::Marker {
                expected: 0xDD,
                found: 0xEE
            })
        );
    }
}
