//! Common test utilities and fixtures for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: fixture factories and background-work helpers
//! - `log_capture`: thread-local capture of tracing events

pub mod fixtures;
pub mod log_capture;
