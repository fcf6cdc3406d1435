use std::io::{self, BufRead, Write};

use anyhow::Result;
use tracing::debug;

use crate::alarm::controller::AlarmHandle;
use crate::config::Settings;

const HELP: &str = "\
commands:
  start [TIME]    arm the alarm (optionally setting the time first)
  stop            cancel the alarm or kill the running command
  time TEXT       set the alarm time, e.g. 10:30 AM
  command TEXT    set the command to run
  show            print the current time and command
  help            print this message
  quit            stop everything and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start(Option<String>),
    Stop,
    SetTime(String),
    SetCommand(String),
    Show,
    Help,
    Quit,
    Empty,
}

pub fn parse_line(line: &str) -> Result<ConsoleCommand, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let argument = (!rest.is_empty()).then(|| rest.to_string());

    match word.to_ascii_lowercase().as_str() {
        "" => Ok(ConsoleCommand::Empty),
        "start" => Ok(ConsoleCommand::Start(argument)),
        "stop" => Ok(ConsoleCommand::Stop),
        "time" => argument
            .map(ConsoleCommand::SetTime)
            .ok_or_else(|| "usage: time TEXT".to_string()),
        "command" | "cmd" => argument
            .map(ConsoleCommand::SetCommand)
            .ok_or_else(|| "usage: command TEXT".to_string()),
        "show" => Ok(ConsoleCommand::Show),
        "help" | "?" => Ok(ConsoleCommand::Help),
        "quit" | "exit" => Ok(ConsoleCommand::Quit),
        other => Err(format!("unknown command '{other}', type 'help'")),
    }
}

/// The two editable fields of the console, as in the settings defaults.
#[derive(Debug, Clone)]
pub struct Fields {
    pub time: String,
    pub command: String,
}

impl From<&Settings> for Fields {
    fn from(settings: &Settings) -> Self {
        Self {
            time: settings.time.clone(),
            command: settings.command.clone(),
        }
    }
}

/// Reads commands until `quit` or end of input, then returns so the caller
/// can shut the controller down.
pub fn run_console(
    handle: &AlarmHandle,
    mut fields: Fields,
    input: impl BufRead,
    mut output: impl Write,
) -> Result<()> {
    writeln!(output, "wakeup: type 'help' for commands")?;
    for line in input.lines() {
        let line = line?;
        let command = match parse_line(&line) {
            Ok(command) => command,
            Err(message) => {
                writeln!(output, "{message}")?;
                continue;
            }
        };
        debug!(?command, "console command");
        match command {
            ConsoleCommand::Empty => {}
            ConsoleCommand::Start(time) => {
                if let Some(time) = time {
                    fields.time = time;
                }
                handle.start(fields.time.clone(), fields.command.clone())?;
            }
            ConsoleCommand::Stop => handle.stop()?,
            ConsoleCommand::SetTime(time) => fields.time = time,
            ConsoleCommand::SetCommand(command) => fields.command = command,
            ConsoleCommand::Show => {
                writeln!(output, "time:    {}", fields.time)?;
                writeln!(output, "command: {}", fields.command)?;
            }
            ConsoleCommand::Help => writeln!(output, "{HELP}")?,
            ConsoleCommand::Quit => break,
        }
        output.flush()?;
    }
    Ok(())
}

pub fn run_stdin_console(handle: &AlarmHandle, fields: Fields) -> Result<()> {
    run_console(handle, fields, io::stdin().lock(), io::stdout())
}
