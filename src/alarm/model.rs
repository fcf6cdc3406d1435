use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};
use thiserror::Error;

/// Format accepted for alarm times, e.g. `10:30 AM`.
pub const TIME_FORMAT: &str = "%I:%M %p";
/// The same format written the way users see it in error messages.
pub const TIME_FORMAT_EXAMPLE: &str = "3:04 PM";

#[derive(Debug, Error)]
pub enum TimeFormatError {
    #[error(transparent)]
    Chrono(#[from] chrono::format::ParseError),
    #[error("minutes must be written with two digits")]
    MinuteDigits,
}

#[derive(Debug, Error)]
#[error("error parsing time {input:?}: {source}")]
pub struct TimeParseError {
    pub input: String,
    #[source]
    pub source: TimeFormatError,
}

/// A wall-clock reading with no date attached, precise to the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    #[cfg(test)]
    pub fn from_hms(hour: u32, minute: u32, second: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, second).map(Self)
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn second(&self) -> u32 {
        self.0.second()
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let fail = |source: TimeFormatError| TimeParseError {
            input: input.to_string(),
            source,
        };
        let text = input.trim();
        let time = NaiveTime::parse_from_str(text, TIME_FORMAT)
            .map_err(|err| fail(err.into()))?;
        // chrono's %M also takes "10:5 AM".
        if !has_two_digit_minutes(text) {
            return Err(fail(TimeFormatError::MinuteDigits));
        }
        Ok(Self(time))
    }
}

fn has_two_digit_minutes(text: &str) -> bool {
    text.split_once(':').is_some_and(|(_, rest)| {
        rest.bytes().take_while(u8::is_ascii_digit).count() == 2
    })
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.second() == 0 {
            write!(f, "{}", self.0.format("%-I:%M %p"))
        } else {
            write!(f, "{}", self.0.format("%-I:%M:%S %p"))
        }
    }
}

/// What the presentation layer is told about the controller.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AlarmStatus {
    Idle,
    Started,
    Firing,
}

impl AlarmStatus {
    pub fn label(&self) -> &'static str {
        match self {
            AlarmStatus::Idle => "",
            AlarmStatus::Started => "Started",
            AlarmStatus::Firing => "Firing",
        }
    }
}

impl fmt::Display for AlarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
