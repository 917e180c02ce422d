mod config;
mod handlers;
mod lagometer;
mod outgoing;
mod quality;
mod realize;
mod session;
mod snapshot;
mod state;
mod step_exchange;

pub use config::{ClientConfig, MAX_STEP_OCTETS};
pub use lagometer::{Lagometer, LagometerSample, LagometerStatus};
pub use quality::ConnectionQuality;
pub use realize::{Realize, RealizeState};
pub use session::ClientSession;
pub use snapshot::GameStateSnapshot;
pub use state::{DisconnectReason, JoinPhase, SessionState};
pub use step_exchange::{StepExchange, optimal_prediction_tick_count};
