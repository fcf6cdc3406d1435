use chrono::{DateTime, Local};

/// Source of the current local time for the controller.
pub trait Clock: Send {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Local>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        thread::sleep(Duration::from_millis(2));
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn fixed_clock_never_moves() {
        let frozen = Local::now();
        let clock = FixedClock(frozen);
        thread::sleep(Duration::from_millis(2));
        assert_eq!(clock.now(), frozen);
        assert_eq!(clock.now(), clock.now());
    }
}
