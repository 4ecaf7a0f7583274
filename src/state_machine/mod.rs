mod phase;
mod run;
mod status;

pub use phase::{Phase, PhaseMachine, Transition};
pub use run::{PhaseRecord, RetryConfig, RunState};
pub use status::{OrchestrationStatus, StatusCell};
