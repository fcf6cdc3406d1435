use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::action::DEFAULT_SHELL;
use crate::alarm::model::{TIME_FORMAT_EXAMPLE, TimeOfDay};

pub const DEFAULT_COMMAND: &str = "mpv -loop inf ~/ring.wav";
pub const DEFAULT_TIME: &str = "10:00 AM";

/// Values pre-filled into the command and time fields, plus the interpreter
/// used to run the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub command: String,
    pub time: String,
    pub shell: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            time: DEFAULT_TIME.to_string(),
            shell: PathBuf::from(DEFAULT_SHELL),
        }
    }
}

/// Command-line values that take precedence over the settings file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub command: Option<String>,
    pub time: Option<String>,
    pub shell: Option<PathBuf>,
}

impl Settings {
    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(command) = overrides.command {
            self.command = command;
        }
        if let Some(time) = overrides.time {
            self.time = time;
        }
        if let Some(shell) = overrides.shell {
            self.shell = shell;
        }
        self
    }
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read settings file {}", path.display()))?;
    parse_settings_text(&content)
}

pub fn parse_settings_text(content: &str) -> Result<Settings> {
    let raw = serde_json::from_str::<SettingsFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != 1 {
        bail!(
            "unsupported settings version {}; expected version 1",
            raw.version
        );
    }

    let defaults = Settings::default();
    if let Some(time) = raw.time.as_deref() {
        time.parse::<TimeOfDay>().with_context(|| {
            format!("invalid time '{time}', expected the form {TIME_FORMAT_EXAMPLE:?}")
        })?;
    }
    if let Some(shell) = raw.shell.as_deref()
        && shell.trim().is_empty()
    {
        bail!("shell must not be empty");
    }

    Ok(Settings {
        command: raw.command.unwrap_or(defaults.command),
        time: raw.time.unwrap_or(defaults.time),
        shell: raw.shell.map(PathBuf::from).unwrap_or(defaults.shell),
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    version: u32,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    shell: Option<String>,
}
