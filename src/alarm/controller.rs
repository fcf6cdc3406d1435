//! The alarm state machine.
//!
//! All transitions happen on one owner thread that drains a channel of
//! [`ControllerEvent`]s. Presentation layers enqueue `Start`/`Stop` through an
//! [`AlarmHandle`]; timer threads enqueue `TimerFired`. Because both arrive on
//! the same queue, a fire and a stop are handled strictly one after the other.

use std::ops::ControlFlow;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::action::{ActionHandle, ActionRunner, KillError, ReleaseError, SpawnError};
use crate::alarm::model::{AlarmStatus, TIME_FORMAT_EXAMPLE, TimeOfDay, TimeParseError};
use crate::alarm::resolver::{delay_until, resolve};
use crate::alarm::timer::{AlarmTimer, ArmError, TimerId};
use crate::clock::Clock;
use crate::presenter::Presenter;

#[derive(Debug, Error)]
#[error("no local time {time} exists after {now}")]
pub struct ResolveError {
    pub time: TimeOfDay,
    pub now: DateTime<Local>,
}

#[derive(Debug, Error)]
pub enum AlarmError {
    #[error(transparent)]
    TimeParse(#[from] TimeParseError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Arm(#[from] ArmError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error(transparent)]
    Kill(#[from] KillError),
    #[error(transparent)]
    Release(#[from] ReleaseError),
}

impl AlarmError {
    pub fn title(&self) -> &'static str {
        match self {
            AlarmError::TimeParse(_) => "Invalid time",
            AlarmError::Resolve(_) | AlarmError::Arm(_) => "Could not set alarm",
            AlarmError::Spawn(_) => "Could not run command",
            AlarmError::Kill(_) => "Could not kill command",
            AlarmError::Release(_) => "Could not release command",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            AlarmError::TimeParse(err) => format!(
                "{err}\nMake sure your time is in the form {TIME_FORMAT_EXAMPLE:?} (without quotes)."
            ),
            AlarmError::Kill(err) => format!("{err}\nYou may need to kill it manually."),
            other => other.to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ControllerEvent {
    Start { time: String, command: String },
    Stop,
    TimerFired(TimerId),
    Shutdown,
}

#[derive(Debug)]
pub enum AlarmState {
    Idle,
    Armed {
        fire_at: DateTime<Local>,
        timer: AlarmTimer,
        command: String,
    },
    Firing {
        action: ActionHandle,
    },
}

impl AlarmState {
    pub fn status(&self) -> AlarmStatus {
        match self {
            AlarmState::Idle => AlarmStatus::Idle,
            AlarmState::Armed { .. } => AlarmStatus::Started,
            AlarmState::Firing { .. } => AlarmStatus::Firing,
        }
    }
}

pub struct AlarmController {
    clock: Box<dyn Clock>,
    presenter: Box<dyn Presenter>,
    runner: ActionRunner,
    state: AlarmState,
    events: Sender<ControllerEvent>,
    next_timer_id: u64,
}

impl AlarmController {
    /// The receiver must be drained by whoever drives the controller, either
    /// [`AlarmController::spawn`] or a test calling [`AlarmController::handle`].
    pub fn new(
        clock: Box<dyn Clock>,
        presenter: Box<dyn Presenter>,
        runner: ActionRunner,
    ) -> (Self, Receiver<ControllerEvent>) {
        let (events, receiver) = mpsc::channel();
        let controller = Self {
            clock,
            presenter,
            runner,
            state: AlarmState::Idle,
            events,
            next_timer_id: 0,
        };
        (controller, receiver)
    }

    pub fn state(&self) -> &AlarmState {
        &self.state
    }

    pub fn status(&self) -> AlarmStatus {
        self.state().status()
    }

    /// Moves the controller onto its owner thread.
    pub fn spawn(self, receiver: Receiver<ControllerEvent>) -> std::io::Result<AlarmHandle> {
        let events = self.events.clone();
        let join = thread::Builder::new()
            .name("alarm-controller".to_string())
            .spawn(move || self.run(receiver))?;
        Ok(AlarmHandle {
            events,
            join: Some(join),
        })
    }

    /// Handles events until `Shutdown`. The controller keeps a sender of its
    /// own for timer threads, so the channel never disconnects by itself.
    pub fn run(mut self, receiver: Receiver<ControllerEvent>) {
        for event in receiver.iter() {
            if self.handle(event).is_break() {
                return;
            }
            debug!(status = %self.status(), "event handled");
        }
    }

    pub fn handle(&mut self, event: ControllerEvent) -> ControlFlow<()> {
        match event {
            ControllerEvent::Start { time, command } => {
                let _ = self.start(&time, &command);
            }
            ControllerEvent::Stop => self.stop(),
            ControllerEvent::TimerFired(id) => self.fire(id),
            ControllerEvent::Shutdown => {
                info!("controller shutting down");
                self.stop();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Retires any previous alarm, then arms a new one. Failures are reported
    /// to the presenter before being returned and leave the controller idle.
    pub fn start(
        &mut self,
        time_text: &str,
        command: &str,
    ) -> Result<DateTime<Local>, AlarmError> {
        self.retire();
        match self.arm(time_text, command) {
            Ok(fire_at) => {
                self.presenter.armed(fire_at);
                self.presenter.status_changed(AlarmStatus::Started);
                Ok(fire_at)
            }
            Err(err) => {
                warn!(time = time_text, "alarm not set: {err}");
                self.report(&err);
                self.presenter.status_changed(AlarmStatus::Idle);
                Err(err)
            }
        }
    }

    pub fn stop(&mut self) {
        self.retire();
        self.presenter.status_changed(AlarmStatus::Idle);
    }

    pub fn fire(&mut self, id: TimerId) {
        let armed_id = match &self.state {
            AlarmState::Armed { timer, .. } => Some(timer.id()),
            _ => None,
        };
        if armed_id != Some(id) {
            debug!(timer = %id, "ignoring notification from a retired timer");
            return;
        }

        let AlarmState::Armed { command, .. } =
            std::mem::replace(&mut self.state, AlarmState::Idle)
        else {
            return;
        };
        match self.runner.start(&command) {
            Ok(action) => {
                info!(pid = action.pid(), command = %command, "alarm firing");
                self.state = AlarmState::Firing { action };
                self.presenter.status_changed(AlarmStatus::Firing);
            }
            Err(err) => {
                error!("alarm fired but the command did not start: {err}");
                self.report(&AlarmError::from(err));
                self.presenter.status_changed(AlarmStatus::Idle);
            }
        }
    }

    fn arm(&mut self, time_text: &str, command: &str) -> Result<DateTime<Local>, AlarmError> {
        let target: TimeOfDay = time_text.parse()?;
        let now = self.clock.now();
        let fire_at = resolve(&now, target).ok_or(ResolveError { time: target, now })?;
        let delay = delay_until(&now, &fire_at);

        self.next_timer_id += 1;
        let id = TimerId(self.next_timer_id);
        let events = self.events.clone();
        let timer = AlarmTimer::arm(id, delay, move |id| {
            let _ = events.send(ControllerEvent::TimerFired(id));
        })?;

        info!(
            timer = %id,
            fire_at = %fire_at.format("%Y-%m-%d %H:%M:%S"),
            delay_secs = timer.delay().as_secs(),
            "alarm armed"
        );
        self.state = AlarmState::Armed {
            fire_at,
            timer,
            command: command.to_string(),
        };
        Ok(fire_at)
    }

    /// Brings the state back to `Idle`, cancelling or killing whatever was
    /// there. Cleanup failures are reported but never stop the transition.
    fn retire(&mut self) {
        match std::mem::replace(&mut self.state, AlarmState::Idle) {
            AlarmState::Idle => {}
            AlarmState::Armed { mut timer, .. } => {
                if timer.cancel() {
                    info!(timer = %timer.id(), "alarm cancelled");
                } else {
                    debug!(timer = %timer.id(), "alarm already fired, dropping notification");
                }
            }
            AlarmState::Firing { action } => {
                let pid = action.pid();
                info!(pid, command = action.command(), "stopping action");
                let retirement = self.runner.retire(action);
                if let Err(err) = retirement.kill {
                    warn!(pid, "kill failed: {err}");
                    self.report(&AlarmError::from(err));
                }
                match retirement.release {
                    Ok(status) => info!(pid, %status, "action stopped"),
                    Err(err) => {
                        warn!(pid, "release failed: {err}");
                        self.report(&AlarmError::from(err));
                    }
                }
            }
        }
    }

    fn report(&self, err: &AlarmError) {
        self.presenter.error(err.title(), &err.detail());
    }
}

#[derive(Debug, Error)]
#[error("alarm controller is no longer running")]
pub struct ControllerGone;

/// Presentation-side handle to a controller running on its owner thread.
///
/// `start` and `stop` only enqueue work and return immediately. Dropping the
/// handle shuts the controller down, which retires any alarm or action.
pub struct AlarmHandle {
    events: Sender<ControllerEvent>,
    join: Option<JoinHandle<()>>,
}

impl AlarmHandle {
    pub fn start(
        &self,
        time: impl Into<String>,
        command: impl Into<String>,
    ) -> Result<(), ControllerGone> {
        self.send(ControllerEvent::Start {
            time: time.into(),
            command: command.into(),
        })
    }

    pub fn stop(&self) -> Result<(), ControllerGone> {
        self.send(ControllerEvent::Stop)
    }

    pub fn sender(&self) -> Sender<ControllerEvent> {
        self.events.clone()
    }

    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    /// Blocks until the owner thread exits; used when nothing else drives
    /// shutdown (headless mode).
    pub fn wait(mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    fn send(&self, event: ControllerEvent) -> Result<(), ControllerGone> {
        self.events.send(event).map_err(|_| ControllerGone)
    }

    fn shutdown_inner(&mut self) {
        let _ = self.events.send(ControllerEvent::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for AlarmHandle {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}
