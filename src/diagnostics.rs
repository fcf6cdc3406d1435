use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::alarm::model::TimeOfDay;
use crate::alarm::resolver::{delay_until, resolve};
use crate::clock::Clock;
use crate::config::Settings;

/// Dry run: shows when an alarm started now would fire, without arming it.
pub fn run_diagnostics(
    settings: &Settings,
    clock: &dyn Clock,
    mut out: impl Write,
) -> Result<()> {
    let target: TimeOfDay = settings.time.parse()?;
    let now = clock.now();
    let fire_at = resolve(&now, target)
        .ok_or_else(|| anyhow!("no local time {target} exists after {now}"))?;
    let delay = delay_until(&now, &fire_at);

    writeln!(out, "wakeup diagnostics")?;
    writeln!(out, "Local time now: {}", now.format("%Y-%m-%d %H:%M:%S %:z"))?;
    writeln!(
        out,
        "Alarm time: {target} ({:02}:{:02}:{:02})",
        target.hour(),
        target.minute(),
        target.second()
    )?;
    writeln!(
        out,
        "Next fire instant: {}",
        fire_at.format("%Y-%m-%d %H:%M:%S %:z")
    )?;
    writeln!(out, "Delay: {}", format_delay(delay.as_secs()))?;
    writeln!(out, "Command: {}", settings.command)?;
    writeln!(
        out,
        "Interpreter: {} ({})",
        settings.shell.display(),
        describe_interpreter(&settings.shell)
    )?;
    Ok(())
}

fn describe_interpreter(shell: &Path) -> String {
    match fs::metadata(shell).with_context(|| format!("cannot stat {}", shell.display())) {
        Ok(meta) if meta.is_file() => "found".to_string(),
        Ok(_) => "not a regular file".to_string(),
        Err(err) => format!("missing: {err:#}"),
    }
}

pub fn format_delay(total_secs: u64) -> String {
    let hours = total_secs / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::{Local, TimeZone};

    use super::*;
    use crate::clock::FixedClock;

    #[test]
    fn formats_delay_as_hours_minutes_seconds() {
        assert_eq!(format_delay(0), "00:00:00");
        assert_eq!(format_delay(90 * 60), "01:30:00");
        assert_eq!(format_delay(23 * 3_600 + 59 * 60 + 1), "23:59:01");
    }

    #[test]
    fn reports_next_day_schedule() {
        let clock = FixedClock(
            Local
                .with_ymd_and_hms(2014, 3, 4, 10, 31, 0)
                .single()
                .expect("valid local time"),
        );
        let settings = Settings {
            command: "echo hi".to_string(),
            time: "10:30 AM".to_string(),
            shell: PathBuf::from("/nonexistent/wakeup-shell"),
        };
        let mut out = Vec::new();
        run_diagnostics(&settings, &clock, &mut out).expect("diagnostics");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("Alarm time: 10:30 AM (10:30:00)"));
        assert!(text.contains("Next fire instant: 2014-03-05 10:30:00"));
        assert!(text.contains("Delay: 23:59:00"));
        assert!(text.contains("Interpreter: /nonexistent/wakeup-shell (missing"));
    }

    #[test]
    fn malformed_time_is_an_error() {
        let settings = Settings {
            time: "25:99 XM".to_string(),
            ..Settings::default()
        };
        let clock = FixedClock(Local::now());
        let err = run_diagnostics(&settings, &clock, Vec::new()).expect_err("bad time");
        assert!(err.to_string().contains("error parsing time"));
    }
}
