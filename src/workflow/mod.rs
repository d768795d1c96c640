// Contract between the steps and the external scheduler

pub mod envelope;
pub mod retry;
pub mod signal;

pub use envelope::StepEnvelope;
pub use retry::RetryPolicy;
pub use signal::{Signal, StepKind};
