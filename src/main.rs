mod action;
mod alarm;
mod api;
mod clock;
mod config;
mod console;
mod diagnostics;
mod presenter;

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::action::ActionRunner;
use crate::alarm::controller::AlarmController;
use crate::api::{ApiPresenter, ApiServer, ApiServerConfig, ApiSharedState};
use crate::clock::{Clock, FixedClock, SystemClock};
use crate::config::{Overrides, Settings, load_settings};
use crate::console::{Fields, run_stdin_console};
use crate::presenter::{ConsolePresenter, Presenters};

#[derive(Parser, Debug)]
#[command(
    name = "wakeup",
    version,
    about = "Run a command at the next occurrence of a time of day"
)]
struct Cli {
    /// JSON settings file with default command, time and shell.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Alarm time, e.g. "10:30 AM".
    #[arg(long)]
    time: Option<String>,

    /// Command to run when the alarm fires.
    #[arg(long)]
    command: Option<String>,

    #[arg(long)]
    shell: Option<PathBuf>,

    /// Start the alarm right away instead of waiting for `start`.
    #[arg(long)]
    arm: bool,

    /// Run without the console; control happens over the API only. End the
    /// run with POST /v1/shutdown: a signal such as SIGTERM exits without
    /// killing a command that is already running.
    #[arg(long, requires = "api")]
    headless: bool,

    #[arg(long)]
    api: bool,

    #[arg(long, default_value = "127.0.0.1")]
    api_bind: String,

    #[arg(long, default_value_t = 8099)]
    api_port: u16,

    #[arg(long)]
    diagnostics: bool,

    /// Local instant to evaluate diagnostics against, e.g. 2014-03-04T10:31:00.
    #[arg(long, requires = "diagnostics", value_parser = parse_local_instant)]
    now: Option<DateTime<Local>>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let file_settings = match &cli.config {
        Some(path) => load_settings(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Settings::default(),
    };
    let settings = file_settings.apply(Overrides {
        command: cli.command,
        time: cli.time,
        shell: cli.shell,
    });

    if cli.diagnostics {
        let clock: Box<dyn Clock> = match cli.now {
            Some(now) => Box::new(FixedClock(now)),
            None => Box::new(SystemClock),
        };
        return diagnostics::run_diagnostics(&settings, clock.as_ref(), io::stdout().lock());
    }

    let api_state = Arc::new(Mutex::new(ApiSharedState::default()));
    let mut presenters = Presenters::new().with(ConsolePresenter);
    if cli.api {
        presenters = presenters.with(ApiPresenter::new(Arc::clone(&api_state)));
    }

    let runner = ActionRunner::new(settings.shell.clone());
    info!(shell = %runner.shell().display(), "using command interpreter");
    let (controller, events) =
        AlarmController::new(Box::new(SystemClock), Box::new(presenters), runner);
    let handle = controller
        .spawn(events)
        .context("failed to start the alarm controller")?;

    let api_server = if cli.api {
        let server = ApiServer::start(
            ApiServerConfig {
                bind_addr: cli.api_bind.clone(),
                port: cli.api_port,
            },
            api_state,
            handle.sender(),
        )
        .with_context(|| {
            format!(
                "failed to start local API at {}:{}",
                cli.api_bind, cli.api_port
            )
        })?;
        Some(server)
    } else {
        None
    };

    if cli.arm {
        handle.start(settings.time.clone(), settings.command.clone())?;
    }

    if cli.headless {
        handle.wait();
        drop(api_server);
        return Ok(());
    }

    let console_result = run_stdin_console(&handle, Fields::from(&settings));
    handle.shutdown();
    drop(api_server);
    console_result
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wakeup=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn parse_local_instant(text: &str) -> Result<DateTime<Local>, String> {
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .map_err(|err| format!("expected YYYY-MM-DDTHH:MM:SS: {err}"))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| format!("{text} does not exist in the local time zone"))
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use super::*;

    #[test]
    fn cli_defaults_match_documented_values() {
        let cli = Cli::try_parse_from(["wakeup"]).expect("parse");
        assert_eq!(cli.api_bind, "127.0.0.1");
        assert_eq!(cli.api_port, 8099);
        assert!(!cli.arm && !cli.headless && !cli.api && !cli.diagnostics);
        assert!(cli.config.is_none() && cli.time.is_none() && cli.now.is_none());
    }

    #[test]
    fn headless_requires_api() {
        assert!(Cli::try_parse_from(["wakeup", "--headless"]).is_err());
        assert!(Cli::try_parse_from(["wakeup", "--headless", "--api"]).is_ok());
    }

    #[test]
    fn now_is_parsed_as_local_instant() {
        let cli = Cli::try_parse_from([
            "wakeup",
            "--diagnostics",
            "--now",
            "2014-03-04T10:31:00",
        ])
        .expect("parse");
        let now = cli.now.expect("now set");
        assert_eq!((now.hour(), now.minute(), now.second()), (10, 31, 0));
        assert!(Cli::try_parse_from(["wakeup", "--diagnostics", "--now", "10:31"]).is_err());
        assert!(Cli::try_parse_from(["wakeup", "--now", "2014-03-04T10:31:00"]).is_err());
    }
}
