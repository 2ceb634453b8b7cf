//! Test utilities for fixtured-unit.
//!
//! Provides scripted state sources, marker services, ready-made containers,
//! and assertion macros for use across all test modules.
//!
//! # Usage
//!
//! ```rust,ignore
//! use fixtured_unit::test_utils::*;
//!
//! let queue = Arc::new(ScriptedCounts::single_kind("immediate", &[3, 2, 1, 0]));
//! let idle = Arc::new(ScriptedCounts::idle());
//! let waiter = DrainWaiter::new(queue, idle);
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::FixtureConfig;
use crate::core::{CountsByKind, ProcessingStateSource, QueueStateSource};
use crate::di::{ServiceCollection, ServiceProviderExt};
use crate::error::{FixtureError, Result};
use crate::fixture::UnitFixture;
use crate::output::TestOutput;

// =============================================================================
// State Sources
// =============================================================================

/// A state source that replays a fixed script of counts.
///
/// Each call (through either source trait) returns the next entry; once the
/// script runs out the last entry repeats forever.
///
/// # Examples
///
/// ```rust,ignore
/// let counts = ScriptedCounts::single_kind("immediate", &[2, 0]);
/// assert_eq!(counts.lengths()?["immediate"], 2);
/// assert_eq!(counts.lengths()?["immediate"], 0);
/// assert_eq!(counts.lengths()?["immediate"], 0);
/// ```
#[derive(Debug)]
pub struct ScriptedCounts {
    script: Vec<CountsByKind>,
    calls: AtomicUsize,
}

impl ScriptedCounts {
    /// Replay `script` as given.
    ///
    /// # Panics
    ///
    /// Panics if `script` is empty.
    #[must_use]
    pub fn new(script: Vec<CountsByKind>) -> Self {
        assert!(!script.is_empty(), "script needs at least one entry");
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    /// Replay `counts` for a single work kind.
    #[must_use]
    pub fn single_kind(kind: &str, counts: &[i64]) -> Self {
        Self::new(
            counts
                .iter()
                .map(|&count| BTreeMap::from([(kind.to_string(), count)]))
                .collect(),
        )
    }

    /// Always reports zero.
    #[must_use]
    pub fn idle() -> Self {
        Self::single_kind("immediate", &[0])
    }

    /// How many times the source has been sampled.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> CountsByKind {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let idx = call.min(self.script.len() - 1);
        self.script[idx].clone()
    }
}

impl QueueStateSource for ScriptedCounts {
    fn lengths(&self) -> Result<CountsByKind> {
        Ok(self.next())
    }
}

#[async_trait]
impl ProcessingStateSource for ScriptedCounts {
    async fn processing_counts(&self) -> Result<CountsByKind> {
        Ok(self.next())
    }
}

/// A state source whose every call fails.
#[derive(Debug)]
pub struct FailingSource {
    message: String,
    calls: AtomicUsize,
}

impl FailingSource {
    #[must_use]
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times the source has been called.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self) -> FixtureError {
        self.calls.fetch_add(1, Ordering::SeqCst);
        FixtureError::StateSource(anyhow::anyhow!("{}", self.message))
    }
}

impl QueueStateSource for FailingSource {
    fn lengths(&self) -> Result<CountsByKind> {
        Err(self.fail())
    }
}

#[async_trait]
impl ProcessingStateSource for FailingSource {
    async fn processing_counts(&self) -> Result<CountsByKind> {
        Err(self.fail())
    }
}

// =============================================================================
// Output Channels
// =============================================================================

/// An output channel that only counts lines.
#[derive(Debug, Default)]
pub struct CountingOutput {
    lines: AtomicUsize,
}

impl CountingOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.lines.load(Ordering::SeqCst)
    }
}

impl TestOutput for CountingOutput {
    fn write_line(&self, _line: &str) {
        self.lines.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Marker Services
// =============================================================================

static NEXT_MARKER: AtomicU64 = AtomicU64::new(1);

fn next_marker_id() -> u64 {
    NEXT_MARKER.fetch_add(1, Ordering::Relaxed)
}

/// Registered as a singleton by [`make_test_services`].
#[derive(Debug)]
pub struct SingletonMarker {
    pub id: u64,
}

/// Registered as scoped by [`make_test_services`]; one per scope.
#[derive(Debug)]
pub struct ScopeMarker {
    pub id: u64,
}

/// A second scoped service that records which [`ScopeMarker`] it was built
/// alongside.
#[derive(Debug)]
pub struct ScopeAffinity {
    pub marker: Arc<ScopeMarker>,
}

/// Scoped service whose teardown is recorded in the singleton [`DisposeLog`].
#[derive(Debug)]
pub struct TrackedResource {
    pub id: u64,
    log: Arc<DisposeLog>,
}

/// Records teardown of [`TrackedResource`]s.
#[derive(Debug, Default)]
pub struct DisposeLog {
    disposed: Mutex<Vec<u64>>,
}

impl DisposeLog {
    /// Ids of resources torn down so far, in order.
    #[must_use]
    pub fn disposed(&self) -> Vec<u64> {
        self.disposed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, id: u64) {
        self.disposed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id);
    }
}

// =============================================================================
// Ready-made Containers
// =============================================================================

/// Services used across the integration tests: the marker services plus a
/// [`TrackedResource`] whose disposal is recorded in the singleton
/// [`DisposeLog`].
#[must_use]
pub fn make_test_services() -> ServiceCollection {
    let mut services = ServiceCollection::new();
    services
        .add_singleton::<SingletonMarker, _>(|_| {
            Ok(Arc::new(SingletonMarker {
                id: next_marker_id(),
            }))
        })
        .add_scoped::<ScopeMarker, _>(|_| {
            Ok(Arc::new(ScopeMarker {
                id: next_marker_id(),
            }))
        })
        .add_scoped::<ScopeAffinity, _>(|sp| {
            Ok(Arc::new(ScopeAffinity {
                marker: sp.get::<ScopeMarker>()?,
            }))
        })
        .add_singleton::<DisposeLog, _>(|_| Ok(Arc::new(DisposeLog::default())))
        .add_scoped_with_dispose::<TrackedResource, _, _, _>(
            |sp| {
                Ok(Arc::new(TrackedResource {
                    id: next_marker_id(),
                    log: sp.get::<DisposeLog>()?,
                }))
            },
            |resource| {
                resource.log.record(resource.id);
                async {}
            },
        );
    services
}

/// [`make_test_services`] wrapped in a fixture with default settings.
#[must_use]
pub fn make_test_fixture() -> Arc<UnitFixture> {
    Arc::new(UnitFixture::from_services(
        make_test_services(),
        FixtureConfig::default(),
    ))
}

/// A fixture with a real background queue, polling every `poll_interval`.
#[must_use]
pub fn make_queue_fixture(poll_interval: Duration) -> Arc<UnitFixture> {
    let mut services = make_test_services();
    services.add_background_queue();
    let mut config = FixtureConfig::default();
    config.drain.poll_interval_ms = u64::try_from(poll_interval.as_millis()).unwrap_or(u64::MAX);
    Arc::new(UnitFixture::from_services(services, config))
}

// =============================================================================
// Environment
// =============================================================================

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Run `f` with `key` set to `value`, restoring the prior value afterwards.
///
/// Serialized across the crate's tests.
pub fn with_env_var(key: &str, value: &str, f: impl FnOnce()) {
    with_env_vars(&[(key, value)], f);
}

/// Run `f` with every `(key, value)` set, restoring prior values afterwards.
#[allow(unsafe_code)]
pub fn with_env_vars(vars: &[(&str, &str)], f: impl FnOnce()) {
    let _guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let prior: Vec<_> = vars
        .iter()
        .map(|(key, _)| ((*key).to_string(), std::env::var(key).ok()))
        .collect();
    for (key, value) in vars {
        // SAFETY: env mutation is serialized by ENV_LOCK
        unsafe { std::env::set_var(key, value) };
    }
    f();
    for (key, value) in prior {
        match value {
            // SAFETY: as above
            Some(value) => unsafe { std::env::set_var(&key, value) },
            None => unsafe { std::env::remove_var(&key) },
        }
    }
}

// =============================================================================
// Temporary Directories
// =============================================================================

/// An isolated temporary directory for config files.
///
/// # Examples
///
/// ```rust,ignore
/// use fixtured_unit::test_utils::TestDir;
///
/// let dir = TestDir::new();
/// dir.create_file("fixture.toml", "[drain]\npoll_interval_ms = 10");
/// assert!(dir.file_path("fixture.toml").exists());
/// ```
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// Create a new isolated temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the temporary directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file in the temporary directory with the given content.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be created or written.
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        let mut file = fs::File::create(&path).expect("Failed to create test file");
        file.write_all(content.as_bytes())
            .expect("Failed to write test file");
    }

    /// Get the full path to a file in the temporary directory.
    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

/// A complete `fixture.toml` for config tests.
#[must_use]
pub fn make_test_config_toml() -> String {
    r#"[drain]
poll_interval_ms = 100
timeout_ms = 5000

[logging]
level = "debug"
format = "compact"
"#
    .to_string()
}

// =============================================================================
// Assertion Macros
// =============================================================================

/// Assert that a string contains a substring.
///
/// # Examples
///
/// ```rust,ignore
/// use fixtured_unit::assert_contains;
///
/// let text = "Background queue is empty; continuing";
/// assert_contains!(text, "empty");
/// ```
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            "Expected string to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
    ($haystack:expr, $needle:expr, $($arg:tt)*) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            $($arg)*
        );
    };
}

/// Assert that a string does NOT contain a substring.
#[macro_export]
macro_rules! assert_not_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            !haystack.contains(needle),
            "Expected string NOT to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert that some captured line contains a substring.
///
/// Works with anything that yields lines, such as
/// [`CapturedOutput::lines`](crate::output::CapturedOutput::lines).
#[macro_export]
macro_rules! assert_line_logged {
    ($lines:expr, $needle:expr) => {
        let lines = $lines;
        let needle = $needle;
        assert!(
            lines.iter().any(|line| line.contains(needle)),
            "Expected a line containing {:?}\n\nCaptured lines:\n{:#?}",
            needle,
            lines
        );
    };
}

// =============================================================================
// Tests for Test Utilities
// =============================================================================
