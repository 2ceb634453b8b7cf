//! Rendering `tracing` events into a test's output channel.

use std::fmt::Write as _;
use std::future::Future;
use std::sync::Arc;

use tracing::instrument::{WithDispatch, WithSubscriber};
use tracing::{Dispatch, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use super::TestOutput;
use crate::core::logging::{LogFormat, LogLevel, env_filter};

/// A [`Layer`] that writes one formatted line per event to a [`TestOutput`].
pub struct SinkLayer {
    output: Arc<dyn TestOutput>,
    format: LogFormat,
}

impl SinkLayer {
    #[must_use]
    pub fn new(output: Arc<dyn TestOutput>, format: LogFormat) -> Self {
        Self { output, format }
    }

    fn render(&self, level: Level, target: &str, visitor: FieldVisitor) -> String {
        match self.format {
            LogFormat::Json => {
                let fields: serde_json::Map<String, serde_json::Value> = visitor
                    .fields
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect();
                serde_json::json!({
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                    "level": level.as_str(),
                    "target": target,
                    "message": visitor.message,
                    "fields": fields,
                })
                .to_string()
            }
            LogFormat::Human => {
                let mut line = format!(
                    "{} {:>5} {target}: {}",
                    chrono::Utc::now().format("%H:%M:%S%.3f"),
                    level.as_str(),
                    visitor.message
                );
                append_fields(&mut line, &visitor.fields);
                line
            }
            LogFormat::Compact => {
                let mut line = format!("{} {}", level.as_str(), visitor.message);
                append_fields(&mut line, &visitor.fields);
                line
            }
        }
    }
}

fn append_fields(line: &mut String, fields: &[(String, String)]) {
    for (name, value) in fields {
        let _ = write!(line, " {name}={value}");
    }
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let metadata = event.metadata();
        let line = self.render(*metadata.level(), metadata.target(), visitor);
        self.output.write_line(&line);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let name = field.name();
        if name == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push((name.to_string(), format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        let name = field.name();
        if name == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((name.to_string(), value.to_string()));
        }
    }
}

/// A per-test logger.
///
/// Wraps a [`Dispatch`] whose events go to one test's output. Fixture
/// operations run under it, and test code can too through
/// [`TestLogger::in_scope`] or [`TestLogger::instrument`].
#[derive(Clone)]
pub struct TestLogger {
    dispatch: Dispatch,
    global: bool,
}

impl std::fmt::Debug for TestLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestLogger")
            .field("global", &self.global)
            .finish_non_exhaustive()
    }
}

impl TestLogger {
    /// Logger that writes to `output`.
    ///
    /// `RUST_LOG` overrides `level` when set.
    #[must_use]
    pub fn for_sink(output: Arc<dyn TestOutput>, level: LogLevel, format: LogFormat) -> Self {
        let filter = env_filter(level);
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(SinkLayer::new(output, format));
        Self {
            dispatch: Dispatch::new(subscriber),
            global: false,
        }
    }

    /// Logger that uses whatever subscriber is the current default.
    ///
    /// This is the opt-out path for code without a fixture. The subscriber it
    /// finds is process state (see [`crate::core::logging::init_global`]) and
    /// is never torn down.
    #[must_use]
    pub fn global() -> Self {
        Self {
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
            global: true,
        }
    }

    /// Whether this logger came from [`TestLogger::global`].
    #[must_use]
    pub const fn is_global(&self) -> bool {
        self.global
    }

    /// The underlying dispatcher.
    #[must_use]
    pub const fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Run `f` with this logger as the thread's default subscriber.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Attach this logger to a future; every poll runs under it.
    pub fn instrument<F: Future>(&self, future: F) -> WithDispatch<F> {
        future.with_subscriber(self.dispatch.clone())
    }

    /// Emit one event at `level` through this logger.
    pub fn log(&self, level: Level, message: &str) {
        self.in_scope(|| match level {
            Level::TRACE => tracing::trace!("{message}"),
            Level::DEBUG => tracing::debug!("{message}"),
            Level::INFO => tracing::info!("{message}"),
            Level::WARN => tracing::warn!("{message}"),
            Level::ERROR => tracing::error!("{message}"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CapturedOutput;

    fn logger(format: LogFormat) -> (TestLogger, CapturedOutput) {
        let output = CapturedOutput::new();
        let logger = TestLogger::for_sink(Arc::new(output.clone()), LogLevel::Debug, format);
        (logger, output)
    }

    #[test]
    fn events_land_in_the_test_output() {
        let (logger, output) = logger(LogFormat::Compact);
        logger.in_scope(|| tracing::debug!(pending = 3, "waiting"));

        assert_eq!(output.lines(), ["DEBUG waiting pending=3"]);
    }

    #[test]
    fn level_filter_applies() {
        let output = CapturedOutput::new();
        let logger = TestLogger::for_sink(Arc::new(output.clone()), LogLevel::Warn, LogFormat::Compact);
        logger.log(Level::INFO, "quiet");
        logger.log(Level::WARN, "loud");

        assert_eq!(output.lines(), ["WARN loud"]);
    }

    #[test]
    fn events_from_other_crates_are_filtered_out() {
        let (logger, output) = logger(LogFormat::Compact);
        logger.in_scope(|| {
            tracing::debug!(target: "hyper::proto", "connection noise");
            tracing::debug!("ours");
        });

        assert_eq!(output.lines(), ["DEBUG ours"]);
    }

    #[test]
    fn json_lines_parse() {
        let (logger, output) = logger(LogFormat::Json);
        logger.in_scope(|| tracing::info!(kind = "immediate", "drained"));

        let line = output.lines().pop().unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["message"], "drained");
        assert_eq!(value["fields"]["kind"], "immediate");
    }

    #[test]
    fn human_lines_carry_target() {
        let (logger, output) = logger(LogFormat::Human);
        logger.log(Level::INFO, "hello");

        let line = output.lines().pop().unwrap();
        assert!(line.contains(" INFO fixtured_unit::output::layer: hello"));
    }

    #[tokio::test]
    async fn instrumented_futures_log_to_the_sink() {
        let (logger, output) = logger(LogFormat::Compact);
        logger
            .instrument(async {
                tokio::task::yield_now().await;
                tracing::debug!("after yield");
            })
            .await;

        assert!(output.contains("after yield"));
    }

    #[test]
    fn global_logger_is_marked() {
        assert!(TestLogger::global().is_global());
        let (logger, _) = logger(LogFormat::Compact);
        assert!(!logger.is_global());
    }
}
