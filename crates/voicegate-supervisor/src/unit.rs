//! Supervised unit abstraction.
//!
//! A [`Launch`] knows how to start one unit; the started [`Unit`] is then
//! owned by the supervisor, which waits on it and signals it. Real units are
//! OS processes ([`crate::process`]); tests substitute in-memory fakes.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::time::Duration;

/// How a unit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitExit {
    /// Exit code, if the unit exited on its own.
    pub code: Option<i32>,
    /// Terminating signal number, if the unit was killed by a signal.
    pub signal: Option<i32>,
}

impl UnitExit {
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn from_signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }
}

impl From<std::process::ExitStatus> for UnitExit {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for UnitExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// A running unit owned by the supervisor.
#[async_trait]
pub trait Unit: Send {
    /// OS process id, if the unit is a live process.
    fn id(&self) -> Option<u32>;

    /// Waits for the unit to exit. Must be cancel safe: the supervisor drops
    /// the future whenever it needs to signal the unit.
    async fn wait(&mut self) -> io::Result<UnitExit>;

    /// Asks the unit to shut down gracefully.
    fn terminate(&mut self) -> io::Result<()>;

    /// Stops the unit immediately.
    fn kill(&mut self) -> io::Result<()>;
}

/// Readiness check run after a unit is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyCheck {
    /// URL that must answer with a 2xx status.
    pub url: String,
    /// How long the unit has to become ready.
    pub timeout: Duration,
}

/// Starts one kind of unit.
pub trait Launch: Send + Sync {
    /// Name used in logs and outcomes.
    fn name(&self) -> &str;

    /// Starts the unit.
    fn launch(&self) -> io::Result<Box<dyn Unit>>;

    /// Check that must pass before the unit counts as running.
    fn ready_check(&self) -> Option<ReadyCheck> {
        None
    }
}

/// Lifecycle state of a supervised unit.
///
/// ```text
/// Idle -> Starting -> Running -> Stopping -> Stopped | Killed
/// Starting -> Stopping            (shutdown before the unit became ready)
/// Starting | Running -> Crashed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Idle,
    Starting,
    Running,
    Stopping,
    /// Exited after a shutdown request, within the grace period.
    Stopped,
    /// Force-killed after ignoring a shutdown request.
    Killed,
    /// Failed to launch, failed readiness, or exited without being asked to.
    Crashed,
}

impl UnitState {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: UnitState) -> bool {
        use UnitState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Running)
                | (Starting, Crashed)
                | (Starting, Stopping)
                | (Running, Stopping)
                | (Running, Crashed)
                | (Stopping, Stopped)
                | (Stopping, Killed)
        )
    }

    /// Whether the unit has finished for good.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UnitState::Stopped | UnitState::Killed | UnitState::Crashed
        )
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UnitState::Idle => "idle",
            UnitState::Starting => "starting",
            UnitState::Running => "running",
            UnitState::Stopping => "stopping",
            UnitState::Stopped => "stopped",
            UnitState::Killed => "killed",
            UnitState::Crashed => "crashed",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        use UnitState::*;
        assert!(Idle.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));
        assert!(Stopping.can_transition_to(Killed));
        assert!(Running.can_transition_to(Crashed));
        assert!(Starting.can_transition_to(Crashed));
        assert!(Starting.can_transition_to(Stopping));
    }

    #[test]
    fn exited_units_never_run_again() {
        use UnitState::*;
        for terminal in [Stopped, Killed, Crashed] {
            assert!(terminal.is_terminal());
            for next in [Idle, Starting, Running, Stopping, Stopped, Killed, Crashed] {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} must not move to {next}"
                );
            }
        }
        assert!(!Idle.can_transition_to(Running));
        assert!(!Stopping.can_transition_to(Running));
    }

    #[test]
    fn exit_display() {
        assert_eq!(UnitExit::from_code(3).to_string(), "exit code 3");
        assert_eq!(UnitExit::from_signal(9).to_string(), "signal 9");
    }
}
