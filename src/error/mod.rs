//! Error types for fixtured-unit.
//!
//! Uses `thiserror` for structured error types with stable codes.
//!
//! ## Error Taxonomy
//!
//! Errors are categorized into six main categories:
//! - **Container**: the root container is gone, a type is unregistered, or a
//!   factory failed
//! - **Scope**: the per-test nested scope was misused
//! - **Drain**: a queue/processing source reported impossible counts, failed,
//!   or the wait was cancelled or timed out
//! - **Lifecycle**: fixture calls made before initialization or after disposal
//! - **Configuration**: config file parsing or validation
//! - **Internal**: I/O and unclassified failures
//!
//! Each error has a stable error code (e.g., `FIX-D001`) and, where it applies,
//! the [`Operation`] that failed, so a failing test can report which of
//! resolve/scope/wait broke and why.

pub mod suggestions;

use std::fmt;
use thiserror::Error;

pub use suggestions::FixSuggestion;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Root container or service registration problems.
    Container,
    /// Nested scope misuse.
    Scope,
    /// Queue drain failures.
    Drain,
    /// Fixture lifecycle ordering problems.
    Lifecycle,
    /// Configuration file or value problems.
    Configuration,
    /// I/O and unclassified failures.
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Container => "Container error",
            Self::Scope => "Scope error",
            Self::Drain => "Drain error",
            Self::Lifecycle => "Lifecycle error",
            Self::Configuration => "Configuration error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Container => "C",
            Self::Scope => "S",
            Self::Drain => "D",
            Self::Lifecycle => "L",
            Self::Configuration => "G",
            Self::Internal => "X",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Operations
// =============================================================================

/// The fixture operation an error was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Service resolution (root or scoped).
    Resolve,
    /// Scope creation or release.
    Scope,
    /// Waiting for the background queue to drain.
    Wait,
    /// Fixture initialization or disposal.
    Lifecycle,
    /// Loading or validating configuration.
    Config,
}

impl Operation {
    /// Lowercase name used in diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Scope => "scope",
            Self::Wait => "wait",
            Self::Lifecycle => "lifecycle",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// FixtureError
// =============================================================================

/// Main error type for fixture operations.
///
/// Each variant has:
/// - A stable error code (e.g., `FIX-C001`)
/// - A category for classification
/// - The failing [`Operation`], when one applies
#[derive(Error, Debug)]
pub enum FixtureError {
    // ==========================================================================
    // Container errors (Category: Container)
    // ==========================================================================
    /// The fixture's root container is absent (torn down or never built).
    #[error("{operation} failed: service container unavailable while handling {type_name}")]
    ContainerUnavailable {
        operation: Operation,
        type_name: &'static str,
    },

    /// The requested type has no registration.
    #[error("service not registered: {type_name}")]
    UnregisteredService { type_name: &'static str },

    /// A scoped service was requested from the root container.
    #[error("scoped service {type_name} cannot be resolved from the root container")]
    ScopeRequired { type_name: &'static str },

    /// A factory asked for the type it is currently constructing.
    #[error("circular dependency while constructing {type_name}")]
    CircularDependency { type_name: &'static str },

    /// A registered factory returned an error.
    #[error("factory for {type_name} failed: {source}")]
    ServiceFactory {
        type_name: &'static str,
        #[source]
        source: anyhow::Error,
    },

    // ==========================================================================
    // Scope errors (Category: Scope)
    // ==========================================================================
    /// `create_scope` was called while a scope is already live.
    #[error("a scope already exists for this test; resolve with scoped = true to reuse it")]
    ScopeAlreadyExists,

    /// Resolution attempted on a scope that has been disposed.
    #[error("scope has been disposed; cannot resolve {type_name}")]
    ScopeDisposed { type_name: &'static str },

    // ==========================================================================
    // Drain errors (Category: Drain)
    // ==========================================================================
    /// A collaborator reported a negative count.
    #[error("invariant violation: {source_name} reported {count} for {kind}")]
    InvariantViolation {
        source_name: &'static str,
        kind: String,
        count: i64,
    },

    /// Aggregating counts across kinds overflowed.
    #[error("count overflow while aggregating {source_name}")]
    CountOverflow { source_name: &'static str },

    /// The operation was cancelled by its caller.
    #[error("{operation} cancelled")]
    Cancelled { operation: Operation },

    /// The configured drain deadline elapsed before quiescence.
    #[error(
        "drain timed out after {elapsed_ms}ms ({pending} pending, {processing} processing)"
    )]
    DrainTimedOut {
        elapsed_ms: u64,
        pending: u64,
        processing: u64,
    },

    /// A queue or processing state source failed.
    #[error("state source failed: {0}")]
    StateSource(#[source] anyhow::Error),

    /// Work was enqueued after the queue stopped accepting it.
    #[error("background queue closed; cannot enqueue {kind} work")]
    QueueClosed { kind: String },

    // ==========================================================================
    // Lifecycle errors (Category: Lifecycle)
    // ==========================================================================
    /// Call made after the fixture was disposed.
    #[error("{operation} called after the fixture was disposed")]
    Disposed { operation: Operation },

    /// Call made before the fixture was initialized.
    #[error("{operation} called before the fixture was initialized")]
    NotInitialized { operation: Operation },

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Config file exists but could not be parsed.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    // ==========================================================================
    // Internal errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FixtureError {
    /// Returns the error category for classification.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::ContainerUnavailable { .. }
            | Self::UnregisteredService { .. }
            | Self::ScopeRequired { .. }
            | Self::CircularDependency { .. }
            | Self::ServiceFactory { .. } => ErrorCategory::Container,

            Self::ScopeAlreadyExists | Self::ScopeDisposed { .. } => ErrorCategory::Scope,

            Self::InvariantViolation { .. }
            | Self::CountOverflow { .. }
            | Self::Cancelled { .. }
            | Self::DrainTimedOut { .. }
            | Self::StateSource(_)
            | Self::QueueClosed { .. } => ErrorCategory::Drain,

            Self::Disposed { .. } | Self::NotInitialized { .. } => ErrorCategory::Lifecycle,

            Self::Config(_) | Self::ConfigParse { .. } => ErrorCategory::Configuration,

            Self::Io(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `FIX-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ContainerUnavailable { .. } => "FIX-C001",
            Self::UnregisteredService { .. } => "FIX-C002",
            Self::ScopeRequired { .. } => "FIX-C003",
            Self::CircularDependency { .. } => "FIX-C004",
            Self::ServiceFactory { .. } => "FIX-C005",

            Self::ScopeAlreadyExists => "FIX-S001",
            Self::ScopeDisposed { .. } => "FIX-S002",

            Self::InvariantViolation { .. } => "FIX-D001",
            Self::CountOverflow { .. } => "FIX-D002",
            Self::Cancelled { .. } => "FIX-D003",
            Self::DrainTimedOut { .. } => "FIX-D004",
            Self::StateSource(_) => "FIX-D005",
            Self::QueueClosed { .. } => "FIX-D006",

            Self::Disposed { .. } => "FIX-L001",
            Self::NotInitialized { .. } => "FIX-L002",

            Self::Config(_) => "FIX-G001",
            Self::ConfigParse { .. } => "FIX-G002",

            Self::Io(_) => "FIX-X001",
        }
    }

    /// Returns the fixture operation that failed, if the error identifies one.
    #[must_use]
    pub const fn operation(&self) -> Option<Operation> {
        match self {
            Self::ContainerUnavailable { operation, .. }
            | Self::Cancelled { operation }
            | Self::Disposed { operation }
            | Self::NotInitialized { operation } => Some(*operation),

            Self::UnregisteredService { .. }
            | Self::ScopeRequired { .. }
            | Self::CircularDependency { .. }
            | Self::ServiceFactory { .. }
            | Self::ScopeDisposed { .. } => Some(Operation::Resolve),

            Self::ScopeAlreadyExists => Some(Operation::Scope),

            Self::InvariantViolation { .. }
            | Self::CountOverflow { .. }
            | Self::DrainTimedOut { .. }
            | Self::StateSource(_) => Some(Operation::Wait),

            Self::Config(_) | Self::ConfigParse { .. } => Some(Operation::Config),

            Self::QueueClosed { .. } | Self::Io(_) => None,
        }
    }

    /// Whether this error is a caller-requested cancellation rather than a fault.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// One-line diagnostic naming the code, the failing operation and the cause.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        match self.operation() {
            Some(op) => format!("[{}] {op}: {self}", self.error_code()),
            None => format!("[{}] {self}", self.error_code()),
        }
    }

    /// Returns actionable fix suggestions for this error.
    #[must_use]
    pub fn fix_suggestions(&self) -> Vec<FixSuggestion> {
        match self {
            Self::ContainerUnavailable { operation, .. } => {
                suggestions::container_unavailable_suggestions(*operation)
            }
            Self::UnregisteredService { type_name } => {
                suggestions::unregistered_service_suggestions(type_name)
            }
            Self::ScopeRequired { type_name } => suggestions::scope_required_suggestions(type_name),
            Self::CircularDependency { type_name } => {
                suggestions::circular_dependency_suggestions(type_name)
            }
            Self::ServiceFactory { type_name, source } => {
                vec![FixSuggestion::new(
                    vec![format!("Check the factory registered for {type_name}")],
                    format!("The factory for {type_name} returned an error: {source}"),
                )]
            }
            Self::ScopeAlreadyExists => suggestions::scope_already_exists_suggestions(),
            Self::ScopeDisposed { type_name } => {
                suggestions::scope_disposed_suggestions(type_name)
            }
            Self::InvariantViolation {
                source_name,
                kind,
                count,
            } => suggestions::invariant_violation_suggestions(source_name, kind, *count),
            Self::CountOverflow { source_name } => {
                suggestions::invariant_violation_suggestions(source_name, "aggregate", i64::MAX)
            }
            Self::Cancelled { .. } => Vec::new(),
            Self::DrainTimedOut {
                pending,
                processing,
                ..
            } => suggestions::drain_timed_out_suggestions(*pending, *processing),
            Self::StateSource(err) => {
                vec![FixSuggestion::new(
                    vec!["Inspect the queue/processing source implementation".to_string()],
                    format!("A state source failed while sampling counts: {err}"),
                )]
            }
            Self::QueueClosed { kind } => {
                vec![FixSuggestion::new(
                    vec!["Enqueue work before stopping the hosted service".to_string()],
                    format!("The {kind} lane no longer accepts work."),
                )]
            }
            Self::Disposed { operation } => suggestions::disposed_suggestions(*operation),
            Self::NotInitialized { operation } => {
                suggestions::not_initialized_suggestions(*operation)
            }
            Self::Config(msg) => suggestions::config_suggestions(msg),
            Self::ConfigParse { path, message } => {
                suggestions::config_parse_suggestions(path, message)
            }
            Self::Io(err) => {
                vec![FixSuggestion::new(
                    vec!["# Check file permissions and paths".to_string()],
                    format!("I/O error: {err}"),
                )]
            }
        }
    }
}

/// Result type alias for fixture operations.
pub type Result<T> = std::result::Result<T, FixtureError>;

// =============================================================================
// Tests
// =============================================================================
