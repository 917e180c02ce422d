pub mod client;
pub mod error;
pub mod log_target;
pub mod net;
pub mod stats;
pub mod steps;

pub use client::{
    ClientConfig, ClientSession, ConnectionQuality, DisconnectReason, GameStateSnapshot,
    JoinPhase, Lagometer, LagometerSample, LagometerStatus, MAX_STEP_OCTETS, Realize,
    RealizeState, SessionState, StepExchange, optimal_prediction_tick_count,
};
pub use error::ClientError;
pub use log_target::LogTarget;
pub use net::{
    BLOB_CHUNK_SIZE, Command, ConnectFlags, DatagramTransport, InStream, MAX_DATAGRAM_SIZE,
    MAX_LOCAL_PARTICIPANTS, MAX_REDUNDANCY_COUNT, MAX_STEPS_PER_DATAGRAM, OutStream,
    ParticipantEntry, PROTOCOL_VERSION, StreamError, UdpTransport, Version,
};
pub use stats::{MovingAverage, NetworkStats, PerSecond};
pub use steps::{PendingSteps, Step, StepBuffer, StepId};
