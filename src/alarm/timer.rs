use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
#[error("failed to arm alarm timer: {0}")]
pub struct ArmError(#[source] pub std::io::Error);

/// One-shot wake-up running on its own thread.
///
/// Either `on_fire` runs once after the delay or `cancel` wins first; the
/// outcome is decided by a single atomic transition out of `PENDING`, so the
/// two can never both take effect.
pub struct AlarmTimer {
    id: TimerId,
    delay: Duration,
    outcome: Arc<AtomicU8>,
    cancel_tx: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl AlarmTimer {
    pub fn arm<F>(id: TimerId, delay: Duration, on_fire: F) -> Result<Self, ArmError>
    where
        F: FnOnce(TimerId) + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        let outcome = Arc::new(AtomicU8::new(PENDING));
        let outcome_for_thread = Arc::clone(&outcome);
        let join = thread::Builder::new()
            .name(format!("alarm-timer-{id}"))
            .spawn(move || match cancel_rx.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => {
                    if outcome_for_thread
                        .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        on_fire(id);
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            })
            .map_err(ArmError)?;

        Ok(Self {
            id,
            delay,
            outcome,
            cancel_tx: Some(cancel_tx),
            join: Some(join),
        })
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn has_fired(&self) -> bool {
        self.outcome.load(Ordering::Acquire) == FIRED
    }

    /// Returns `true` when the notification was suppressed, `false` when it
    /// had already been delivered (or the timer was cancelled before).
    ///
    /// The wait thread is woken and joined either way.
    pub fn cancel(&mut self) -> bool {
        let won = self
            .outcome
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
        won
    }
}

impl fmt::Debug for AlarmTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlarmTimer")
            .field("id", &self.id)
            .field("delay", &self.delay)
            .field("fired", &self.has_fired())
            .finish()
    }
}

impl Drop for AlarmTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
