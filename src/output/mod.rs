//! Per-test output capture.
//!
//! A test hands the fixture its output channel (any [`TestOutput`]). The
//! container's [`InjectableTestOutputSink`] forwards to whichever channel was
//! injected last, and a [`TestLogger`] renders `tracing` events into it.

pub mod layer;
pub mod sink;

use std::sync::{Arc, Mutex, PoisonError};

pub use layer::{SinkLayer, TestLogger};
pub use sink::InjectableTestOutputSink;

/// A line-oriented output channel owned by one test.
pub trait TestOutput: Send + Sync {
    /// Write one line.
    fn write_line(&self, line: &str);
}

/// Writes to stdout, which the test harness captures per test.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutOutput;

impl TestOutput for StdoutOutput {
    fn write_line(&self, line: &str) {
        println!("{line}");
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default, Clone)]
pub struct CapturedOutput {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CapturedOutput {
    /// Create an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether any line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|line| line.contains(needle))
    }
}

impl TestOutput for CapturedOutput {
    fn write_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}
