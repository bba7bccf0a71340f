//! Group supervision of cooperating units.
//!
//! Every unit is required: if one exits before shutdown was requested the
//! whole group is brought down. Shutdown is graceful first (terminate, then a
//! grace period) and forceful after (kill). Nothing is restarted.

use crate::readiness::wait_until_ready;
use crate::unit::{Launch, Unit, UnitExit, UnitState};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

/// How long killed units get to report their exit before they are abandoned.
const KILL_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Terminate,
    Kill,
}

#[derive(Debug)]
struct UnitEvent {
    index: usize,
    result: io::Result<UnitExit>,
}

/// Why a supervised group failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitFailure {
    /// The unit could not be started.
    LaunchFailed { unit: String, reason: String },
    /// The unit started but its readiness check never passed.
    NotReady { unit: String, reason: String },
    /// The unit exited without being asked to. `exit` is `None` when its
    /// status could not be collected.
    UnexpectedExit {
        unit: String,
        exit: Option<UnitExit>,
    },
    /// The unit ignored the terminate request and had to be killed.
    GraceExceeded { unit: String },
}

impl UnitFailure {
    /// Name of the unit that caused the failure.
    pub fn unit(&self) -> &str {
        match self {
            UnitFailure::LaunchFailed { unit, .. }
            | UnitFailure::NotReady { unit, .. }
            | UnitFailure::UnexpectedExit { unit, .. }
            | UnitFailure::GraceExceeded { unit } => unit,
        }
    }
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitFailure::LaunchFailed { unit, reason } => {
                write!(f, "unit {unit} failed to launch: {reason}")
            }
            UnitFailure::NotReady { unit, reason } => {
                write!(f, "unit {unit} never became ready: {reason}")
            }
            UnitFailure::UnexpectedExit {
                unit,
                exit: Some(exit),
            } => write!(f, "unit {unit} exited unexpectedly with {exit}"),
            UnitFailure::UnexpectedExit { unit, exit: None } => {
                write!(f, "unit {unit} exited unexpectedly")
            }
            UnitFailure::GraceExceeded { unit } => {
                write!(f, "unit {unit} ignored terminate and was killed")
            }
        }
    }
}

/// Final record of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    pub name: String,
    pub state: UnitState,
    pub pid: Option<u32>,
    pub exit: Option<UnitExit>,
}

/// Aggregate result of supervising a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOutcome {
    pub units: Vec<UnitReport>,
    /// The first failure observed, if any.
    pub failure: Option<UnitFailure>,
}

impl GroupOutcome {
    /// True when every unit stopped because shutdown was requested.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn unit(&self, name: &str) -> Option<&UnitReport> {
        self.units.iter().find(|report| report.name == name)
    }
}

struct Slot {
    name: String,
    state: UnitState,
    pid: Option<u32>,
    exit: Option<UnitExit>,
    control: Option<mpsc::UnboundedSender<Control>>,
    task: Option<JoinHandle<()>>,
    /// Whether the runner has reported the unit's exit.
    reported: bool,
    kill_sent: bool,
}

impl Slot {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: UnitState::Idle,
            pid: None,
            exit: None,
            control: None,
            task: None,
            reported: false,
            kill_sent: false,
        }
    }

    fn transition(&mut self, next: UnitState) {
        if self.state.can_transition_to(next) {
            tracing::debug!(unit = %self.name, from = %self.state, to = %next, "unit state change");
            self.state = next;
        } else {
            tracing::warn!(
                unit = %self.name,
                from = %self.state,
                to = %next,
                "ignoring invalid unit state change"
            );
        }
    }

    fn is_live(&self) -> bool {
        self.task.is_some() && !self.reported
    }

    fn send(&mut self, command: Control) {
        if command == Control::Kill {
            self.kill_sent = true;
        }
        let delivered = self
            .control
            .as_ref()
            .is_some_and(|control| control.send(command).is_ok());
        if !delivered {
            tracing::debug!(unit = %self.name, ?command, "unit runner already finished");
        }
    }

    fn report(&self) -> UnitReport {
        UnitReport {
            name: self.name.clone(),
            state: self.state,
            pid: self.pid,
            exit: self.exit,
        }
    }
}

/// Owns a group of units and drives them through their lifecycle.
pub struct Supervisor {
    slots: Vec<Slot>,
    events_tx: mpsc::UnboundedSender<UnitEvent>,
    events_rx: mpsc::UnboundedReceiver<UnitEvent>,
    grace: Duration,
    shutdown_requested: bool,
    failure: Option<UnitFailure>,
}

impl Supervisor {
    /// Creates a supervisor that gives units `grace` to exit after terminate.
    pub fn new(grace: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            slots: Vec::new(),
            events_tx,
            events_rx,
            grace,
            shutdown_requested: false,
            failure: None,
        }
    }

    /// The first failure observed so far.
    pub fn failure(&self) -> Option<&UnitFailure> {
        self.failure.as_ref()
    }

    /// Current state of every unit, in launch order.
    pub fn states(&self) -> Vec<(String, UnitState)> {
        self.slots
            .iter()
            .map(|slot| (slot.name.clone(), slot.state))
            .collect()
    }

    fn has_live_units(&self) -> bool {
        self.slots.iter().any(Slot::is_live)
    }

    fn record_failure(&mut self, failure: UnitFailure) {
        if self.failure.is_none() {
            tracing::error!(unit = failure.unit(), "{failure}");
            self.failure = Some(failure);
        } else {
            tracing::warn!(unit = failure.unit(), "{failure}");
        }
    }

    /// Launches every unit, then waits for their readiness checks.
    ///
    /// All units are launched before any check is awaited and the checks run
    /// concurrently. Launching stops at the first unit that fails to launch;
    /// the remaining launchers are recorded as never started. Waiting stops at
    /// the first failure: a failed check or any unit exit. Units already
    /// launched are left for [`Supervisor::terminate_all`].
    ///
    /// Cancel safe: dropping the future aborts pending checks and leaves every
    /// launched unit to `terminate_all`.
    ///
    /// # Errors
    ///
    /// Returns the recorded failure.
    pub async fn start(&mut self, launchers: Vec<Box<dyn Launch>>) -> Result<(), UnitFailure> {
        let mut checks = JoinSet::new();
        let mut checked_units = HashMap::new();
        let mut launchers = launchers.into_iter();

        while let Some(launcher) = launchers.next() {
            let index = self.slots.len();
            let mut slot = Slot::new(launcher.name());
            slot.transition(UnitState::Starting);
            self.slots.push(slot);

            let unit = match launcher.launch() {
                Ok(unit) => unit,
                Err(e) => {
                    self.slots[index].transition(UnitState::Crashed);
                    self.record_failure(UnitFailure::LaunchFailed {
                        unit: launcher.name().to_string(),
                        reason: e.to_string(),
                    });
                    self.slots
                        .extend(launchers.by_ref().map(|rest| Slot::new(rest.name())));
                    break;
                }
            };

            let pid = unit.id();
            let (control_tx, control_rx) = mpsc::unbounded_channel();
            let task = tokio::spawn(drive_unit(
                index,
                launcher.name().to_string(),
                unit,
                control_rx,
                self.events_tx.clone(),
            ));

            let slot = &mut self.slots[index];
            slot.pid = pid;
            slot.control = Some(control_tx);
            slot.task = Some(task);
            tracing::info!(unit = %slot.name, pid = ?pid, "unit launched");

            match launcher.ready_check() {
                Some(check) => {
                    let handle = checks.spawn(async move {
                        let result = wait_until_ready(&check).await;
                        (index, check.url, result)
                    });
                    checked_units.insert(handle.id(), index);
                }
                None => slot.transition(UnitState::Running),
            }
        }

        while self.failure.is_none() {
            tokio::select! {
                joined = checks.join_next() => match joined {
                    Some(Ok((index, url, result))) => self.apply_readiness(index, &url, result),
                    Some(Err(e)) => {
                        if let Some(&index) = checked_units.get(&e.id()) {
                            let reason = format!("readiness check failed: {e}");
                            self.apply_readiness(index, "", Err(reason));
                        }
                    }
                    None => break,
                },
                event = self.events_rx.recv() => {
                    if let Some(event) = event {
                        self.apply_event(event);
                    }
                }
            }
        }

        match self.failure.clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn apply_readiness(&mut self, index: usize, url: &str, result: Result<(), String>) {
        let slot = &mut self.slots[index];
        if slot.state != UnitState::Starting {
            return;
        }
        match result {
            Ok(()) => {
                tracing::info!(unit = %slot.name, url, "unit ready");
                slot.transition(UnitState::Running);
            }
            Err(reason) => {
                slot.transition(UnitState::Crashed);
                slot.send(Control::Kill);
                let unit = slot.name.clone();
                self.record_failure(UnitFailure::NotReady { unit, reason });
            }
        }
    }

    fn apply_event(&mut self, event: UnitEvent) {
        let shutdown_requested = self.shutdown_requested;
        let slot = &mut self.slots[event.index];
        slot.reported = true;
        slot.exit = match event.result {
            Ok(exit) => Some(exit),
            Err(e) => {
                tracing::warn!(unit = %slot.name, error = %e, "failed to collect unit exit status");
                None
            }
        };

        let exit_label = slot
            .exit
            .map_or_else(|| "unknown".to_string(), |exit| exit.to_string());

        if slot.state.is_terminal() {
            tracing::info!(unit = %slot.name, exit = %exit_label, "unit reaped");
            return;
        }

        if slot.state == UnitState::Stopping && slot.kill_sent {
            tracing::warn!(unit = %slot.name, exit = %exit_label, "unit killed");
            slot.transition(UnitState::Killed);
        } else if slot.state == UnitState::Stopping && shutdown_requested {
            tracing::info!(unit = %slot.name, exit = %exit_label, "unit stopped");
            slot.transition(UnitState::Stopped);
        } else {
            slot.transition(UnitState::Crashed);
            let failure = UnitFailure::UnexpectedExit {
                unit: slot.name.clone(),
                exit: slot.exit,
            };
            self.record_failure(failure);
        }
    }

    /// Waits until any live unit exits and returns its report.
    ///
    /// Returns `None` once no unit is left to wait for. Cancel safe.
    pub async fn await_any(&mut self) -> Option<UnitReport> {
        if !self.has_live_units() {
            return None;
        }
        let event = self.events_rx.recv().await?;
        let index = event.index;
        self.apply_event(event);
        Some(self.slots[index].report())
    }

    /// Asks every starting or running unit to terminate, then waits out the grace period
    /// and kills whatever is left.
    ///
    /// Terminate is queued for every unit before any waiting starts. Units
    /// that do not report even after being killed are abandoned, so this
    /// always returns.
    pub async fn terminate_all(&mut self) {
        self.shutdown_requested = true;

        for slot in &mut self.slots {
            if matches!(slot.state, UnitState::Starting | UnitState::Running) {
                slot.transition(UnitState::Stopping);
                slot.send(Control::Terminate);
                tracing::info!(unit = %slot.name, pid = ?slot.pid, "sent terminate");
            }
        }

        let grace_deadline = Instant::now() + self.grace;
        if !self.drain_until(grace_deadline).await {
            self.kill_remaining();
            let kill_deadline = Instant::now() + KILL_WAIT;
            if !self.drain_until(kill_deadline).await {
                self.abandon_remaining();
            }
        }
    }

    /// Collects exits until no unit is live. Returns false on deadline.
    async fn drain_until(&mut self, deadline: Instant) -> bool {
        while self.has_live_units() {
            match tokio::time::timeout_at(deadline, self.await_any()).await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => return false,
            }
        }
        true
    }

    fn kill_remaining(&mut self) {
        let mut overdue = Vec::new();
        for slot in self.slots.iter_mut().filter(|slot| slot.is_live()) {
            if slot.state == UnitState::Stopping {
                overdue.push(slot.name.clone());
            }
            tracing::warn!(unit = %slot.name, pid = ?slot.pid, "grace period elapsed, killing unit");
            slot.send(Control::Kill);
        }
        for unit in overdue {
            self.record_failure(UnitFailure::GraceExceeded { unit });
        }
    }

    fn abandon_remaining(&mut self) {
        for slot in self.slots.iter_mut().filter(|slot| slot.is_live()) {
            tracing::error!(unit = %slot.name, pid = ?slot.pid, "unit did not exit after kill, abandoning it");
            if let Some(task) = &slot.task {
                task.abort();
            }
            slot.reported = true;
            if slot.state == UnitState::Stopping {
                slot.transition(UnitState::Killed);
            }
        }
    }

    /// Waits for every unit runner to finish and returns the group outcome.
    ///
    /// Terminates the group first if any unit is still live.
    pub async fn join(mut self) -> GroupOutcome {
        if self.has_live_units() {
            self.terminate_all().await;
        }

        for slot in &mut self.slots {
            if let Some(task) = slot.task.take() {
                if let Err(e) = task.await {
                    if !e.is_cancelled() {
                        tracing::warn!(unit = %slot.name, error = %e, "unit runner task failed");
                    }
                }
            }
        }

        GroupOutcome {
            units: self.slots.iter().map(Slot::report).collect(),
            failure: self.failure,
        }
    }

    /// Starts the group, waits for a unit exit or `shutdown`, whichever comes
    /// first, then stops everything and returns the outcome.
    pub async fn run<F>(mut self, launchers: Vec<Box<dyn Launch>>, shutdown: F) -> GroupOutcome
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let started = tokio::select! {
            biased;
            () = &mut shutdown => {
                tracing::info!("shutdown requested during startup, stopping all units");
                false
            }
            result = self.start(launchers) => result.is_ok(),
        };

        if started {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    tracing::info!("shutdown requested, stopping all units");
                }
                report = self.await_any() => {
                    if let Some(report) = report {
                        tracing::warn!(unit = %report.name, state = %report.state, "unit exited, stopping the group");
                    }
                }
            }
        }

        self.terminate_all().await;
        self.join().await
    }
}

/// Owns one unit: reports its exit and applies control commands.
async fn drive_unit(
    index: usize,
    name: String,
    mut unit: Box<dyn Unit>,
    mut control: mpsc::UnboundedReceiver<Control>,
    events: mpsc::UnboundedSender<UnitEvent>,
) {
    let result = loop {
        tokio::select! {
            result = unit.wait() => break result,
            command = control.recv() => match command {
                Some(Control::Terminate) => {
                    if let Err(e) = unit.terminate() {
                        tracing::warn!(unit = %name, error = %e, "failed to send terminate");
                    }
                }
                Some(Control::Kill) => {
                    if let Err(e) = unit.kill() {
                        tracing::warn!(unit = %name, error = %e, "failed to kill unit");
                    }
                }
                None => {
                    // Supervisor is gone; nobody will ever signal this unit again.
                    if let Err(e) = unit.kill() {
                        tracing::warn!(unit = %name, error = %e, "failed to kill orphaned unit");
                    }
                    break unit.wait().await;
                }
            }
        }
    };

    if events.send(UnitEvent { index, result }).is_err() {
        tracing::debug!(unit = %name, "supervisor dropped before unit exit was reported");
    }
}
