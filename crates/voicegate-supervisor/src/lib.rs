//! Process-group supervision for the voicegate deployment.
//!
//! Launches the session handler and the token service as one group, waits
//! for either an operator shutdown or any unit exiting, and then stops every
//! unit: terminate first, kill after the grace period.

pub mod config;
pub mod process;
pub mod readiness;
pub mod shutdown;
pub mod supervisor;
pub mod unit;

pub use process::{ProcessSpec, ProcessUnit};
pub use shutdown::ShutdownSignal;
pub use supervisor::{GroupOutcome, Supervisor, UnitFailure, UnitReport};
pub use unit::{Launch, ReadyCheck, Unit, UnitExit, UnitState};
