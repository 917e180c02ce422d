mod blob;
mod integrity;
mod ordered;
mod protocol;
mod stream;
mod transport;

pub use blob::{BLOB_CHUNK_SIZE, BlobError, BlobStreamIn, write_chunk};
pub use integrity::{ConnectionSecret, integrity_tag, verify_integrity_tag};
pub use ordered::{OrderedDatagramIn, OrderedDatagramOut};
pub use protocol::{
    Command, ConnectFlags, ConnectRequest, ConnectResponse, DownloadGameStateRequest,
    DownloadGameStateResponse, GameStepResponseHeader, JoinGameOutOfParticipantSlots,
    JoinGameRequest, JoinGameResponse, MAX_DATAGRAM_SIZE, MAX_LOCAL_PARTICIPANTS,
    MAX_REDUNDANCY_COUNT, MAX_STEPS_PER_DATAGRAM, MIN_HEADER_SIZE, OUT_OF_BAND_CONNECTION_ID,
    PONG_MARKER, PROTOCOL_VERSION, ParticipantEntry, Version, read_step_run, write_step_run,
};
pub use stream::{InStream, OutStream, StreamError};
pub use transport::{DatagramTransport, UdpTransport};
