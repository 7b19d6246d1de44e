//! Severity levels understood by the appender.
//!
//! [`EventLevel`] is the level attached to events by the host logging
//! framework. [`Severity`] is the syslog-style GELF level carried on the
//! wire, where a lower number means a more severe event.

use std::fmt;
use std::str::FromStr;

/// GELF severity, ordered from most to least severe.
///
/// The derived ordering follows the numeric syslog value, so
/// `Severity::Emergency < Severity::Debug`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Severity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Informational = 6,
    Debug = 7,
}

impl Severity {
    /// Numeric syslog value written to the `level` field.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Return `true` when `self` is as severe as `threshold` or more so.
    pub fn is_at_least(self, threshold: Severity) -> bool {
        self.code() <= threshold.code()
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::Informational
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Emergency => "EMERGENCY",
            Severity::Alert => "ALERT",
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
            Severity::Informational => "INFO",
            Severity::Debug => "DEBUG",
        };
        f.write_str(s)
    }
}

impl FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EMERGENCY" => Ok(Self::Emergency),
            "ALERT" => Ok(Self::Alert),
            "CRITICAL" => Ok(Self::Critical),
            "ERROR" => Ok(Self::Error),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "NOTICE" => Ok(Self::Notice),
            "INFO" | "INFORMATIONAL" => Ok(Self::Informational),
            "DEBUG" => Ok(Self::Debug),
            _ => Err(()),
        }
    }
}

/// Level attached to an event by the host logging framework.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventLevel {
    All,
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl EventLevel {
    /// Map the event level onto a GELF severity.
    ///
    /// Returns `None` for [`EventLevel::Off`], which never produces a
    /// message. `Trace` collapses onto `Debug` and `All` onto `Notice`.
    pub fn severity(self) -> Option<Severity> {
        match self {
            EventLevel::Error => Some(Severity::Error),
            EventLevel::Warn => Some(Severity::Warning),
            EventLevel::Info => Some(Severity::Informational),
            EventLevel::Debug | EventLevel::Trace => Some(Severity::Debug),
            EventLevel::All => Some(Severity::Notice),
            EventLevel::Off => None,
        }
    }

    pub fn is_off(self) -> bool {
        self == EventLevel::Off
    }
}

impl Default for EventLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventLevel::All => "ALL",
            EventLevel::Trace => "TRACE",
            EventLevel::Debug => "DEBUG",
            EventLevel::Info => "INFO",
            EventLevel::Warn => "WARN",
            EventLevel::Error => "ERROR",
            EventLevel::Off => "OFF",
        };
        f.write_str(s)
    }
}

impl FromStr for EventLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALL" => Ok(Self::All),
            "TRACE" => Ok(Self::Trace),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            "OFF" => Ok(Self::Off),
            _ => Err(()),
        }
    }
}

impl From<log::Level> for EventLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => EventLevel::Trace,
            log::Level::Debug => EventLevel::Debug,
            log::Level::Info => EventLevel::Info,
            log::Level::Warn => EventLevel::Warn,
            log::Level::Error => EventLevel::Error,
        }
    }
}
