//! # Job State Machine
//!
//! `Created → Started → Completed`, or `Created → FailedDuringCreation` when
//! setup fails before any object is touched.

pub mod errors;
pub mod events;
pub mod job_state_machine;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::JobEvent;
pub use job_state_machine::{JobStateMachine, JobTransition};
pub use states::JobState;
