use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use super::TestOutput;

/// Lines kept while no channel is injected.
const MAX_BUFFERED_LINES: usize = 1024;

#[derive(Default)]
struct SinkState {
    output: Option<Arc<dyn TestOutput>>,
    buffered: VecDeque<String>,
}

/// Output sink registered in the container and re-pointed at each test's
/// channel.
///
/// Lines written before the first injection are buffered (oldest dropped
/// past a fixed cap) and flushed into the first channel injected.
#[derive(Default)]
pub struct InjectableTestOutputSink {
    state: Mutex<SinkState>,
}

impl std::fmt::Debug for InjectableTestOutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectableTestOutputSink")
            .field("injected", &self.is_injected())
            .finish_non_exhaustive()
    }
}

impl InjectableTestOutputSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the sink at `output`, replacing any earlier channel.
    pub fn inject(&self, output: Arc<dyn TestOutput>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for line in state.buffered.drain(..) {
            output.write_line(&line);
        }
        state.output = Some(output);
    }

    /// Whether a channel has been injected.
    #[must_use]
    pub fn is_injected(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .output
            .is_some()
    }
}

impl TestOutput for InjectableTestOutputSink {
    fn write_line(&self, line: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(output) = &state.output {
            output.write_line(line);
            return;
        }
        if state.buffered.len() == MAX_BUFFERED_LINES {
            state.buffered.pop_front();
        }
        state.buffered.push_back(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CapturedOutput;

    #[test]
    fn lines_before_injection_are_flushed() {
        let sink = InjectableTestOutputSink::new();
        sink.write_line("early");
        assert!(!sink.is_injected());

        let output = CapturedOutput::new();
        sink.inject(Arc::new(output.clone()));
        sink.write_line("late");

        assert!(sink.is_injected());
        assert_eq!(output.lines(), ["early", "late"]);
    }

    #[test]
    fn reinjection_redirects_output() {
        let sink = InjectableTestOutputSink::new();
        let first = CapturedOutput::new();
        let second = CapturedOutput::new();

        sink.inject(Arc::new(first.clone()));
        sink.write_line("one");
        sink.inject(Arc::new(second.clone()));
        sink.write_line("two");

        assert_eq!(first.lines(), ["one"]);
        assert_eq!(second.lines(), ["two"]);
    }

    #[test]
    fn buffer_is_bounded() {
        let sink = InjectableTestOutputSink::new();
        for i in 0..=MAX_BUFFERED_LINES {
            sink.write_line(&i.to_string());
        }
        let output = CapturedOutput::new();
        sink.inject(Arc::new(output.clone()));

        let lines = output.lines();
        assert_eq!(lines.len(), MAX_BUFFERED_LINES);
        assert_eq!(lines[0], "1");
    }
}
