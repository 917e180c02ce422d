use std::io;

use crate::net::{BlobError, StreamError};
use crate::steps::StepError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport failed: {0}")]
    Transport(#[from] io::Error),
    #[error("datagram of {0} octets is shorter than the header")]
    TooShort(usize),
    #[error("datagram for connection {got} while assigned {expected:?}")]
    ForeignConnection { expected: Option<u8>, got: u8 },
    #[error("session is disconnected")]
    Disconnected,
    #[error("integrity tag does not match connection")]
    IntegrityTag,
    #[error("duplicate or reordered datagram (delta {0})")]
    DuplicateOrReordered(i32),
    #[error("unknown command {0:#04X}")]
    UnknownCommand(u8),
    #[error("command {0:#04X} is not accepted out of band")]
    OutOfBandCommand(u8),
    #[error("malformed message: {0}")]
    Stream(#[from] StreamError),
    #[error("server reported {0} participants, more than supported")]
    TooManyParticipants(usize),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(&'static str),
    #[error("predicted step buffer is full")]
    PredictedBufferFull,
    #[error("step of {size} octets exceeds limit of {limit}")]
    StepTooLarge { size: usize, limit: usize },
    #[error("state download failed: {0}")]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Step(#[from] StepError),
}

impl ClientError {
    /// Transport failures abort the tick; everything else only drops the datagram.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
