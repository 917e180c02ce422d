mod buffer;
mod pending;

pub use buffer::{Step, StepBuffer};
pub use pending::{PendingReceive, PendingSteps, RECEIVE_MASK_BITS};

pub type StepId = u32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("step {got} written out of order, expected {expected}")]
    OutOfOrder { expected: StepId, got: StepId },
    #[error("step buffer is full ({capacity} steps)")]
    Full { capacity: usize },
}
