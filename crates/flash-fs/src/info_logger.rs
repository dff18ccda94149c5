//! Structured logging at mount, write, unlink, and compaction boundaries.
//!
//! This crate emits [`tracing`] events at each of those boundaries. A host that does not want to
//! link `tracing`'s ecosystem can instead (or additionally) supply a [`LogSink`]: a plain
//! object-safe callback receiving a level and an already-formatted message, the Rust-idiomatic
//! equivalent of a C API's function-pointer-plus-string callback.

use std::fmt::{Debug, Formatter, Result as FmtResult};

use tracing::Level as LogLevel;


/// A host-supplied sink for filesystem log events, as an alternative or supplement to `tracing`
/// subscribers.
pub trait LogSink {
    fn log(&self, level: LogLevel, message: &str);
}

impl<F: Fn(LogLevel, &str)> LogSink for F {
    fn log(&self, level: LogLevel, message: &str) {
        self(level, message);
    }
}

/// Forwards log events to `tracing` unconditionally, and to an optional [`LogSink`] when one is
/// configured.
pub(crate) struct LogGate {
    sink: Option<Box<dyn LogSink>>,
}

impl LogGate {
    #[must_use]
    pub(crate) const fn new(sink: Option<Box<dyn LogSink>>) -> Self {
        Self { sink }
    }

    pub(crate) fn log_event<F: FnOnce() -> String>(&self, level: LogLevel, message: F) {
        let sink_wants_it = self.sink.is_some();
        let tracing_wants_it = match level {
            LogLevel::ERROR => tracing::event_enabled!(LogLevel::ERROR),
            LogLevel::WARN  => tracing::event_enabled!(LogLevel::WARN),
            LogLevel::INFO  => tracing::event_enabled!(LogLevel::INFO),
            LogLevel::DEBUG => tracing::event_enabled!(LogLevel::DEBUG),
            LogLevel::TRACE => tracing::event_enabled!(LogLevel::TRACE),
        };

        if !sink_wants_it && !tracing_wants_it {
            return;
        }

        let message = message();

        match level {
            LogLevel::ERROR => tracing::event!(LogLevel::ERROR, message = %message),
            LogLevel::WARN  => tracing::event!(LogLevel::WARN,  message = %message),
            LogLevel::INFO  => tracing::event!(LogLevel::INFO,  message = %message),
            LogLevel::DEBUG => tracing::event!(LogLevel::DEBUG, message = %message),
            LogLevel::TRACE => tracing::event!(LogLevel::TRACE, message = %message),
        }

        if let Some(sink) = &self.sink {
            sink.log(level, &message);
        }
    }
}

impl Debug for LogGate {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("LogGate")
            .field("sink", &self.sink.as_ref().map(|_| "<dyn LogSink>"))
            .finish()
    }
}
