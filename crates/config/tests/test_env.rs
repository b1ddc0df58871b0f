//! Tests for environment overrides

use serial_test::serial;
use std::time::Duration;
use warden_config::{Config, IDLE_TIMEOUT_ENV, WORKER_ID_ENV};

#[test]
#[serial]
fn test_idle_timeout_from_config_without_env() {
    std::env::remove_var(IDLE_TIMEOUT_ENV);

    let mut config = Config::default();
    config.runtime.idle_timeout_secs = 90;

    assert_eq!(config.idle_timeout(), Duration::from_secs(90));
}

#[test]
#[serial]
fn test_idle_timeout_env_wins_over_config() {
    std::env::set_var(IDLE_TIMEOUT_ENV, "15");

    let mut config = Config::default();
    config.runtime.idle_timeout_secs = 90;

    assert_eq!(config.idle_timeout(), Duration::from_secs(15));

    std::env::remove_var(IDLE_TIMEOUT_ENV);
}

#[test]
#[serial]
fn test_idle_timeout_bad_env_falls_back() {
    std::env::set_var(IDLE_TIMEOUT_ENV, "soon");

    let config = Config::default();
    assert_eq!(config.idle_timeout(), Duration::from_secs(3600));

    std::env::remove_var(IDLE_TIMEOUT_ENV);
}

#[test]
#[serial]
fn test_worker_id_resolution() {
    std::env::remove_var(WORKER_ID_ENV);

    let mut config = Config::default();
    assert_eq!(config.worker_id().unwrap(), None);

    config.runtime.worker_id = Some(12);
    assert_eq!(config.worker_id().unwrap(), Some(12));

    std::env::set_var(WORKER_ID_ENV, "512");
    assert_eq!(config.worker_id().unwrap(), Some(512));

    std::env::set_var(WORKER_ID_ENV, "not-a-number");
    assert!(config.worker_id().is_err());

    std::env::remove_var(WORKER_ID_ENV);
}
