//! Small global logging facade.
//!
//! Mirrors the two operating modes a headless audio/MIDI hub needs: a
//! standalone mode that writes straight to the terminal, and an embedded
//! mode that forwards `LogMessage`s over a channel (e.g. to a supervising
//! TUI or GUI process). Subsystems never call `println!`/`eprintln!`
//! directly; they go through [`log_println!`]/[`log_eprintln!`], which route
//! through whichever mode is currently active.

use crossbeam_channel::Sender;
use std::fmt;
use std::sync::{Mutex, OnceLock};

/// Severity of a single log line, also used to implement `--log-level`
/// filtering (0 = Fatal only .. 5 = everything, matching the CLI's scale).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Severity {
    /// Maps the CLI's `--log-level` integer (0..=5) to the lowest severity
    /// that should still be emitted.
    pub fn from_cli_level(level: u16) -> Severity {
        match level {
            0 => Severity::Fatal,
            1 => Severity::Error,
            2 => Severity::Warn,
            3 => Severity::Info,
            4 => Severity::Debug,
            _ => Severity::Trace,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Fatal => write!(f, "[FATAL]"),
            Severity::Error => write!(f, "[ERROR]"),
            Severity::Warn => write!(f, "[WARN]"),
            Severity::Info => write!(f, "[INFO]"),
            Severity::Debug => write!(f, "[DEBUG]"),
            Severity::Trace => write!(f, "[TRACE]"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogMessage {
    pub level: Severity,
    pub msg: String,
}

impl fmt::Display for LogMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.level, self.msg)
    }
}

enum LoggerMode {
    Standalone,
    Embedded(Sender<LogMessage>),
}

struct Logger {
    mode: Mutex<LoggerMode>,
    min_level: Mutex<Severity>,
}

static GLOBAL_LOGGER: OnceLock<Logger> = OnceLock::new();

fn logger() -> &'static Logger {
    GLOBAL_LOGGER.get_or_init(|| Logger {
        mode: Mutex::new(LoggerMode::Standalone),
        min_level: Mutex::new(Severity::Debug),
    })
}

/// Sets the minimum severity that will actually be printed/forwarded.
/// Called once at startup from `--log-level`.
pub fn set_min_level(level: Severity) {
    *logger().min_level.lock().unwrap() = level;
}

/// Switches the logger into embedded mode, forwarding every message over
/// `sender` instead of writing to the terminal.
pub fn set_embedded_mode(sender: Sender<LogMessage>) {
    *logger().mode.lock().unwrap() = LoggerMode::Embedded(sender);
}

pub fn log(level: Severity, msg: String) {
    let l = logger();
    if level > *l.min_level.lock().unwrap() {
        return;
    }
    let entry = LogMessage { level, msg };
    match &*l.mode.lock().unwrap() {
        LoggerMode::Standalone => match entry.level {
            Severity::Fatal | Severity::Error => eprintln!("{}", entry),
            _ => println!("{}", entry),
        },
        LoggerMode::Embedded(sender) => {
            if sender.try_send(entry.clone()).is_err() {
                eprintln!("logger channel full/closed: {}", entry);
            }
        }
    }
}

#[macro_export]
macro_rules! log_println {
    ($($arg:tt)*) => {
        $crate::logger::log($crate::logger::Severity::Info, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_eprintln {
    ($($arg:tt)*) => {
        $crate::logger::log($crate::logger::Severity::Error, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logger::log($crate::logger::Severity::Debug, format!($($arg)*))
    };
}
