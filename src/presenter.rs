use std::io::{self, Write};

use chrono::{DateTime, Local};

use crate::alarm::model::AlarmStatus;

/// Notifications flowing from the controller to whatever displays it.
pub trait Presenter: Send {
    fn status_changed(&self, status: AlarmStatus);

    fn error(&self, title: &str, detail: &str);

    fn armed(&self, _fire_at: DateTime<Local>) {}
}

/// Prints status lines to stdout and errors to stderr.
#[derive(Debug, Default)]
pub struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn status_changed(&self, status: AlarmStatus) {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "status: {}", status.label());
        let _ = out.flush();
    }

    fn error(&self, title: &str, detail: &str) {
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "{title}: {detail}");
    }

    fn armed(&self, fire_at: DateTime<Local>) {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "alarm set for {}", fire_at.format("%Y-%m-%d %H:%M:%S %Z"));
        let _ = out.flush();
    }
}

/// Forwards every notification to each inner presenter in order.
#[derive(Default)]
pub struct Presenters(Vec<Box<dyn Presenter>>);

impl Presenters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, presenter: impl Presenter + 'static) -> Self {
        self.0.push(Box::new(presenter));
        self
    }
}

impl Presenter for Presenters {
    fn status_changed(&self, status: AlarmStatus) {
        for presenter in &self.0 {
            presenter.status_changed(status);
        }
    }

    fn error(&self, title: &str, detail: &str) {
        for presenter in &self.0 {
            presenter.error(title, detail);
        }
    }

    fn armed(&self, fire_at: DateTime<Local>) {
        for presenter in &self.0 {
            presenter.armed(fire_at);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingPresenter;
    use super::*;

    #[test]
    fn fan_out_reaches_every_presenter() {
        let first = RecordingPresenter::default();
        let second = RecordingPresenter::default();
        let presenters = Presenters::new().with(first.clone()).with(second.clone());

        presenters.status_changed(AlarmStatus::Started);
        presenters.error("Invalid time", "bad input");

        for recorder in [first, second] {
            assert_eq!(recorder.statuses(), vec![AlarmStatus::Started]);
            assert_eq!(
                recorder.errors(),
                vec![("Invalid time".to_string(), "bad input".to_string())]
            );
        }
    }
}
