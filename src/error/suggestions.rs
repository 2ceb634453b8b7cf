//! Fix suggestion database for fixture errors.
//!
//! Maps error variants to the steps that usually resolve them, so a failing
//! test prints something more useful than the bare error.

use super::Operation;

// =============================================================================
// Fix Suggestion Types
// =============================================================================

/// A fix suggestion for an error.
#[derive(Debug, Clone)]
pub struct FixSuggestion {
    /// Steps to try, in order of preference.
    pub steps: Vec<String>,

    /// Explanation of why this error occurred.
    pub context: String,

    /// Tips to prevent this error in the future.
    pub prevention: Option<String>,
}

impl FixSuggestion {
    /// Creates a new fix suggestion with required fields.
    #[must_use]
    pub fn new(steps: Vec<String>, context: impl Into<String>) -> Self {
        Self {
            steps,
            context: context.into(),
            prevention: None,
        }
    }

    /// Builder: adds prevention tips.
    #[must_use]
    pub fn with_prevention(mut self, prevention: impl Into<String>) -> Self {
        self.prevention = Some(prevention.into());
        self
    }
}

// =============================================================================
// Suggestion Generators
// =============================================================================

/// Suggestions when the root container is gone.
#[must_use]
pub fn container_unavailable_suggestions(operation: Operation) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![
                "Keep the UnitFixture alive for the whole test".to_string(),
                "Build the fixture with UnitFixture::new(container)".to_string(),
            ],
            format!(
                "The fixture's service container was missing during {operation}. \
                 The fixture was either shut down before the test finished or \
                 never received a container."
            ),
        )
        .with_prevention("Only call UnitFixture::shutdown after every test using it has disposed."),
    ]
}

/// Suggestions for unregistered services.
#[must_use]
pub fn unregistered_service_suggestions(type_name: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![
            format!("Register {type_name} on the ServiceCollection used to build the fixture"),
            "Check that the registration uses the exact type being resolved (trait object vs concrete)"
                .to_string(),
        ],
        format!("No registration exists for {type_name}."),
    )]
}

/// Suggestions when a scoped service is resolved from the root.
#[must_use]
pub fn scope_required_suggestions(type_name: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("Resolve {type_name} with scoped = true")],
        format!("{type_name} is registered as scoped and only lives inside a scope."),
    )]
}

/// Suggestions for circular dependencies.
#[must_use]
pub fn circular_dependency_suggestions(type_name: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!(
            "Break the cycle in the factory chain that leads back to {type_name}"
        )],
        format!("The factory for {type_name} (transitively) asked for {type_name} again."),
    )]
}

/// Suggestions when a second scope is requested.
#[must_use]
pub fn scope_already_exists_suggestions() -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec!["Use resolve(scoped = true); it creates the scope on first use".to_string()],
            "A scope is already live for this test. Replacing it would orphan the \
             services bound to it.",
        )
        .with_prevention("Call create_scope at most once per test, or not at all."),
    ]
}

/// Suggestions for resolution on a disposed scope.
#[must_use]
pub fn scope_disposed_suggestions(type_name: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["Resolve scoped services before disposing the test".to_string()],
        format!("{type_name} was requested from a scope that has already been torn down."),
    )]
}

/// Suggestions for impossible counts reported by a collaborator.
#[must_use]
pub fn invariant_violation_suggestions(
    source_name: &str,
    kind: &str,
    count: i64,
) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!(
            "Audit increment/decrement pairs in the {source_name} implementation"
        )],
        format!(
            "The {source_name} source reported {count} for {kind}. Counts can never be \
             negative; this is a counting bug in the background processor."
        ),
    )]
}

/// Suggestions for drain timeouts.
#[must_use]
pub fn drain_timed_out_suggestions(pending: u64, processing: u64) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![
                "Raise drain.timeout_ms in fixture.toml or FIXTURE_DRAIN_TIMEOUT_MS".to_string(),
                "Check that the hosted worker is running".to_string(),
            ],
            format!(
                "The queue still had {pending} pending and {processing} processing items \
                 when the deadline elapsed."
            ),
        )
        .with_prevention("Avoid enqueueing new work concurrently with a drain wait."),
    ]
}

/// Suggestions for calls after disposal.
#[must_use]
pub fn disposed_suggestions(operation: Operation) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("Move the {operation} call before dispose")],
        "The test fixture has been disposed; its scope and logger are gone.",
    )]
}

/// Suggestions for calls before initialization.
#[must_use]
pub fn not_initialized_suggestions(operation: Operation) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![
            "Call initialize() first".to_string(),
            "Or use FixturedTest::start / FixturedTest::run".to_string(),
        ],
        format!("{operation} needs an initialized fixture."),
    )]
}

/// Suggestions for invalid configuration values.
#[must_use]
pub fn config_suggestions(message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["Review fixture.toml and FIXTURE_* environment variables".to_string()],
        format!("Configuration error: {message}"),
    )]
}

/// Suggestions for config parse failures.
#[must_use]
pub fn config_parse_suggestions(path: &str, message: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![format!("Fix or remove {path}")],
            format!("The config file at {path} is not valid TOML: {message}"),
        )
        .with_prevention("A missing config file is fine; defaults apply."),
    ]
}

// =============================================================================
// Tests
// =============================================================================
