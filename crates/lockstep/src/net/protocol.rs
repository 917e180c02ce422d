use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::stream::{InStream, OutStream, StreamError};
use crate::steps::StepId;

pub const MAX_DATAGRAM_SIZE: usize = 1200;
pub const MAX_LOCAL_PARTICIPANTS: usize = 8;
pub const MAX_REDUNDANCY_COUNT: usize = 3;
pub const MAX_STEPS_PER_DATAGRAM: usize = 16;
pub const PONG_MARKER: u8 = 0xDD;

/// Connection id, sequence and command id.
pub const MIN_HEADER_SIZE: usize = 4;
pub const OUT_OF_BAND_CONNECTION_ID: u8 = 0;

pub const PROTOCOL_VERSION: Version = Version::new(0, 1, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl Version {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn write(&self, stream: &mut OutStream) -> Result<(), StreamError> {
        stream.write_u16(self.major)?;
        stream.write_u16(self.minor)?;
        stream.write_u16(self.patch)
    }

    pub fn read(stream: &mut InStream) -> Result<Self, StreamError> {
        Ok(Self {
            major: stream.read_u16()?,
            minor: stream.read_u16()?,
            patch: stream.read_u16()?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ConnectFlags: u8 {
        const USE_DEBUG_STREAMS = 0x01;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    JoinGameRequest = 0x01,
    GameStep = 0x02,
    DownloadGameStateRequest = 0x03,
    DownloadGameStateStatus = 0x04,
    ConnectRequest = 0x05,
    JoinGameResponse = 0x11,
    GameStepResponse = 0x12,
    DownloadGameStateResponse = 0x13,
    GameStatePart = 0x14,
    ConnectResponse = 0x15,
    JoinGameOutOfParticipantSlots = 0x16,
}

impl Command {
    pub fn from_u8(value: u8) -> Option<Self> {
        let command = match value {
            0x01 => Self::JoinGameRequest,
            0x02 => Self::GameStep,
            0x03 => Self::DownloadGameStateRequest,
            0x04 => Self::DownloadGameStateStatus,
            0x05 => Self::ConnectRequest,
            0x11 => Self::JoinGameResponse,
            0x12 => Self::GameStepResponse,
            0x13 => Self::DownloadGameStateResponse,
            0x14 => Self::GameStatePart,
            0x15 => Self::ConnectResponse,
            0x16 => Self::JoinGameOutOfParticipantSlots,
            _ => return None,
        };
        Some(command)
    }

    pub fn write(self, stream: &mut OutStream) -> Result<(), StreamError> {
        stream.write_u8(self as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub protocol_version: Version,
    pub application_version: Version,
    pub flags: ConnectFlags,
}

impl ConnectRequest {
    pub fn write(&self, stream: &mut OutStream) -> Result<(), StreamError> {
        Command::ConnectRequest.write(stream)?;
        self.protocol_version.write(stream)?;
        self.application_version.write(stream)?;
        stream.write_u8(self.flags.bits())
    }

    pub fn read(stream: &mut InStream) -> Result<Self, StreamError> {
        Ok(Self {
            protocol_version: Version::read(stream)?,
            application_version: Version::read(stream)?,
            flags: ConnectFlags::from_bits_truncate(stream.read_u8()?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectResponse {
    pub connection_id: u8,
    pub flags: ConnectFlags,
    pub connection_secret: u64,
}

impl ConnectResponse {
    pub fn write(&self, stream: &mut OutStream) -> Result<(), StreamError> {
        Command::ConnectResponse.write(stream)?;
        stream.write_u8(self.connection_id)?;
        stream.write_u8(self.flags.bits())?;
        stream.write_u64(self.connection_secret)
    }

    pub fn read(stream: &mut InStream) -> Result<Self, StreamError> {
        Ok(Self {
            connection_id: stream.read_u8()?,
            flags: ConnectFlags::from_bits_truncate(stream.read_u8()?),
            connection_secret: stream.read_u64()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JoinGameRequest {
    pub nonce: u64,
    pub local_indices: Vec<u8>,
}

impl JoinGameRequest {
    pub fn write(&self, stream: &mut OutStream) -> Result<(), StreamError> {
        Command::JoinGameRequest.write(stream)?;
        stream.write_u64(self.nonce)?;
        stream.write_u8(self.local_indices.len() as u8)?;
        for &index in &self.local_indices {
            stream.write_u8(index)?;
        }
        Ok(())
    }

    pub fn read(stream: &mut InStream) -> Result<Self, StreamError> {
        let nonce = stream.read_u64()?;
        let count = stream.read_u8()? as usize;
        let local_indices = stream.read_octets(count)?.to_vec();
        Ok(Self {
            nonce,
            local_indices,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParticipantEntry {
    pub local_index: u8,
    pub participant_id: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGameResponse {
    pub nonce: u64,
    pub participant_connection_index: u8,
    pub session_secret: u64,
    pub participants: Vec<ParticipantEntry>,
}

impl JoinGameResponse {
    pub fn write(&self, stream: &mut OutStream) -> Result<(), StreamError> {
        Command::JoinGameResponse.write(stream)?;
        stream.write_u64(self.nonce)?;
        stream.write_u8(self.participant_connection_index)?;
        stream.write_u64(self.session_secret)?;
        stream.write_u8(self.participants.len() as u8)?;
        for entry in &self.participants {
            stream.write_u8(entry.local_index)?;
            stream.write_u8(entry.participant_id)?;
        }
        Ok(())
    }

    /// Participant count is not bounded here; the session decides what it accepts.
    pub fn read(stream: &mut InStream) -> Result<Self, StreamError> {
        let nonce = stream.read_u64()?;
        let participant_connection_index = stream.read_u8()?;
        let session_secret = stream.read_u64()?;
        let count = stream.read_u8()? as usize;
        let mut participants = Vec::with_capacity(count);
        for _ in 0..count {
            participants.push(ParticipantEntry {
                local_index: stream.read_u8()?,
                participant_id: stream.read_u8()?,
            });
        }
        Ok(Self {
            nonce,
            participant_connection_index,
            session_secret,
            participants,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinGameOutOfParticipantSlots {
    pub nonce: u64,
}

impl JoinGameOutOfParticipantSlots {
    pub fn write(&self, stream: &mut OutStream) -> Result<(), StreamError> {
        Command::JoinGameOutOfParticipantSlots.write(stream)?;
        stream.write_u64(self.nonce)
    }

    pub fn read(stream: &mut InStream) -> Result<Self, StreamError> {
        Ok(Self {
            nonce: stream.read_u64()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadGameStateRequest {
    pub client_request_id: u8,
}

impl DownloadGameStateRequest {
    pub fn write(&self, stream: &mut OutStream) -> Result<(), StreamError> {
        Command::DownloadGameStateRequest.write(stream)?;
        stream.write_u8(self.client_request_id)
    }

    pub fn read(stream: &mut InStream) -> Result<Self, StreamError> {
        Ok(Self {
            client_request_id: stream.read_u8()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadGameStateResponse {
    pub client_request_id: u8,
    pub step_id: StepId,
    pub octet_count: u32,
    pub channel: u16,
}

impl DownloadGameStateResponse {
    pub fn write(&self, stream: &mut OutStream) -> Result<(), StreamError> {
        Command::DownloadGameStateResponse.write(stream)?;
        stream.write_u8(self.client_request_id)?;
        stream.write_u32(self.step_id)?;
        stream.write_u32(self.octet_count)?;
        stream.write_u16(self.channel)
    }

    pub fn read(stream: &mut InStream) -> Result<Self, StreamError> {
        Ok(Self {
            client_request_id: stream.read_u8()?,
            step_id: stream.read_u32()?,
            octet_count: stream.read_u32()?,
            channel: stream.read_u16()?,
        })
    }
}

/// Server header of a game step response, ahead of the authoritative steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameStepResponseHeader {
    pub incoming_buffer_count: u8,
    pub buffer_delta: i8,
    pub echoed_timestamp: u16,
    pub last_received_predicted_step_id: StepId,
}

impl GameStepResponseHeader {
    pub fn write(&self, stream: &mut OutStream) -> Result<(), StreamError> {
        Command::GameStepResponse.write(stream)?;
        stream.write_u8(self.incoming_buffer_count)?;
        stream.write_i8(self.buffer_delta)?;
        stream.write_u16(self.echoed_timestamp)?;
        stream.write_u32(self.last_received_predicted_step_id)
    }

    pub fn read(stream: &mut InStream) -> Result<Self, StreamError> {
        Ok(Self {
            incoming_buffer_count: stream.read_u8()?,
            buffer_delta: stream.read_i8()?,
            echoed_timestamp: stream.read_u16()?,
            last_received_predicted_step_id: stream.read_u32()?,
        })
    }
}

/// Contiguous run of steps: `count u8`, `first id u32` when count > 0, then `(len u16, octets)` each.
pub fn write_step_run<'a, I>(
    stream: &mut OutStream,
    first_id: StepId,
    steps: I,
) -> Result<(), StreamError>
where
    I: ExactSizeIterator<Item = &'a [u8]>,
{
    stream.write_u8(steps.len() as u8)?;
    if steps.len() == 0 {
        return Ok(());
    }
    stream.write_u32(first_id)?;
    for payload in steps {
        stream.write_u16(payload.len() as u16)?;
        stream.write_octets(payload)?;
    }
    Ok(())
}

pub fn read_step_run<'a>(
    stream: &mut InStream<'a>,
) -> Result<Vec<(StepId, &'a [u8])>, StreamError> {
    let count = stream.read_u8()? as usize;
    if count == 0 {
        return Ok(Vec::new());
    }
    let first_id = stream.read_u32()?;
    let mut steps = Vec::with_capacity(count);
    for offset in 0..count {
        let len = stream.read_u16()? as usize;
        steps.push((
            first_id.wrapping_add(offset as StepId),
            stream.read_octets(len)?,
        ));
    }
    Ok(steps)
}
