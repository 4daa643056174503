// Injectable logging sinks
//
// The render graph and the resource allocator receive their sink explicitly
// instead of reaching for a process-wide logger. The binaries wire the
// `LogFacadeSink` so messages still flow through env_logger.

use log::Level;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

pub type SharedSink = Arc<dyn LogSink>;

/// Destination for diagnostic messages of a component
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, target: &str, args: fmt::Arguments<'_>);

    fn debug(&self, target: &str, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, target, args);
    }

    fn info(&self, target: &str, args: fmt::Arguments<'_>) {
        self.log(Level::Info, target, args);
    }

    fn warn(&self, target: &str, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, target, args);
    }
}

/// Discards everything. Default for components built without a sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: Level, _target: &str, _args: fmt::Arguments<'_>) {}
}

/// Writes `[LEVEL target] message` lines to stdout
#[derive(Debug, Clone, Copy)]
pub struct StdoutSink {
    pub min_level: Level,
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self { min_level: Level::Info }
    }
}

impl LogSink for StdoutSink {
    fn log(&self, level: Level, target: &str, args: fmt::Arguments<'_>) {
        if level <= self.min_level {
            println!("[{:<5} {}] {}", level, target, args);
        }
    }
}

/// Forwards to the `log` facade (and therefore to env_logger in the binaries)
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFacadeSink;

impl LogSink for LogFacadeSink {
    fn log(&self, level: Level, target: &str, args: fmt::Arguments<'_>) {
        log::logger().log(
            &log::Record::builder()
                .level(level)
                .target(target)
                .args(args)
                .build(),
        );
    }
}

/// Keeps every message in memory; handy for asserting on diagnostics
#[derive(Debug, Default)]
pub struct CaptureSink {
    lines: Mutex<Vec<(Level, String)>>,
}

impl CaptureSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|(_, line)| line.contains(needle))
    }
}

impl LogSink for CaptureSink {
    fn log(&self, level: Level, _target: &str, args: fmt::Arguments<'_>) {
        self.lines.lock().push((level, args.to_string()));
    }
}

pub fn null_sink() -> SharedSink {
    Arc::new(NullSink)
}
