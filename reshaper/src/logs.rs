//! Pipeline log helpers.
//!
//! Jobs report progress through the `log_*` functions below. Entries are
//! emitted as `tracing` events on the `budget_reshaper` target, so the
//! subscriber installed by [`init`] decides where they go (stderr by default,
//! leaving stdout free for table output).

use tracing_subscriber::EnvFilter;

/// Log level of a pipeline entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Log message
    pub message: String,
    /// Nesting depth (sub-steps of a job)
    pub indent: u8,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Info, message: message.into(), indent: 0 }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Success, message: message.into(), indent: 0 }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Warning, message: message.into(), indent: 0 }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Error, message: message.into(), indent: 0 }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }

    /// Emit this entry as a tracing event.
    pub fn emit(&self) {
        let pad = "  ".repeat(self.indent as usize);
        match self.level {
            LogLevel::Info => tracing::info!(indent = self.indent, "{}{}", pad, self.message),
            LogLevel::Success => {
                tracing::info!(indent = self.indent, success = true, "{}{}", pad, self.message)
            }
            LogLevel::Warning => tracing::warn!(indent = self.indent, "{}{}", pad, self.message),
            LogLevel::Error => tracing::error!(indent = self.indent, "{}{}", pad, self.message),
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` when `verbose`.
/// Calling this twice is harmless: the second install is ignored.
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

pub fn log_info(msg: impl Into<String>) {
    LogEntry::info(msg).emit();
}

pub fn log_success(msg: impl Into<String>) {
    LogEntry::success(msg).emit();
}

pub fn log_warning(msg: impl Into<String>) {
    LogEntry::warning(msg).emit();
}

pub fn log_error(msg: impl Into<String>) {
    LogEntry::error(msg).emit();
}

pub fn log_info_indent(msg: impl Into<String>, indent: u8) {
    LogEntry::info(msg).with_indent(indent).emit();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_builders() {
        let entry = LogEntry::warning("3 rows skipped").with_indent(2);
        assert_eq!(entry.level, LogLevel::Warning);
        assert_eq!(entry.indent, 2);
        assert_eq!(entry.message, "3 rows skipped");
    }

    #[test]
    fn test_emit_without_subscriber_does_not_panic() {
        log_info("no subscriber installed");
        log_error("still fine");
    }
}
