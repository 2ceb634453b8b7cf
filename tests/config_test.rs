//! Integration tests for fixture configuration files and env overrides.

mod common;

use std::time::Duration;

use common::fixtures::make_test_services;
use fixtured_unit::config::{ENV_CONFIG, ENV_DRAIN_TIMEOUT_MS, ENV_POLL_INTERVAL_MS};
use fixtured_unit::core::logging::{LogFormat, LogLevel};
use fixtured_unit::test_utils::{TestDir, make_test_config_toml, with_env_var, with_env_vars};
use fixtured_unit::{FixtureConfig, FixtureError, UnitFixture};

#[test]
fn full_config_file_is_loaded() {
    let dir = TestDir::new();
    dir.create_file("fixture.toml", &make_test_config_toml());

    let config = FixtureConfig::load_from(&dir.file_path("fixture.toml")).unwrap();
    assert_eq!(config.drain.poll_interval_ms, 100);
    assert_eq!(config.drain.timeout_ms, Some(5000));
    assert_eq!(config.log_level(), LogLevel::Debug);
    assert_eq!(config.log_format(), LogFormat::Compact);

    let policy = config.drain_policy();
    assert_eq!(policy.poll_interval, Duration::from_millis(100));
    assert_eq!(policy.timeout, Some(Duration::from_secs(5)));
}

#[test]
fn missing_file_means_defaults() {
    let dir = TestDir::new();
    let config = FixtureConfig::load_from(&dir.file_path("absent.toml")).unwrap();
    assert_eq!(config, FixtureConfig::default());
    assert_eq!(
        config.drain_policy().poll_interval,
        Duration::from_millis(500)
    );
    assert_eq!(config.drain_policy().timeout, None);
}

#[test]
fn malformed_file_names_its_path() {
    let dir = TestDir::new();
    dir.create_file("fixture.toml", "[drain\npoll_interval_ms = ");

    let err = FixtureConfig::load_from(&dir.file_path("fixture.toml")).unwrap_err();
    match &err {
        FixtureError::ConfigParse { path, .. } => assert!(path.ends_with("fixture.toml")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.error_code(), "FIX-G002");
}

#[test]
fn fixture_from_environment_reads_the_configured_file() {
    let dir = TestDir::new();
    dir.create_file("custom.toml", "[drain]\npoll_interval_ms = 25\n");
    let path = dir.file_path("custom.toml");

    with_env_var(ENV_CONFIG, path.to_str().unwrap(), || {
        let fixture = UnitFixture::from_environment(make_test_services()).unwrap();
        assert_eq!(
            fixture.drain_policy().poll_interval,
            Duration::from_millis(25)
        );
        assert!(fixture.is_available());
    });
}

#[test]
fn env_vars_override_the_file() {
    let dir = TestDir::new();
    dir.create_file("fixture.toml", &make_test_config_toml());
    let path = dir.file_path("fixture.toml");

    with_env_vars(
        &[
            (ENV_CONFIG, path.to_str().unwrap()),
            (ENV_POLL_INTERVAL_MS, "40"),
            (ENV_DRAIN_TIMEOUT_MS, "0"),
        ],
        || {
            let config = FixtureConfig::resolve().unwrap();
            assert_eq!(config.drain.poll_interval_ms, 40);
            assert_eq!(config.drain.timeout_ms, None);
        },
    );
}

#[test]
fn invalid_settings_fail_fixture_construction() {
    let dir = TestDir::new();
    dir.create_file("fixture.toml", "[drain]\npoll_interval_ms = 0\n");
    let path = dir.file_path("fixture.toml");

    with_env_var(ENV_CONFIG, path.to_str().unwrap(), || {
        let err = UnitFixture::from_environment(make_test_services()).unwrap_err();
        assert!(matches!(err, FixtureError::Config(_)));
        assert!(err.diagnostic().starts_with("[FIX-G001] config:"));
    });
}
