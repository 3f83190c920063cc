//! Tests for worker dependency wiring.

use super::*;
use serial_test::serial;

const CREDENTIAL_VARS: [&str; 2] = ["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"];

fn clear_credentials() {
    for var in CREDENTIAL_VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_no_queue_is_disabled_without_aws_credentials() {
    clear_credentials();
    let config = WorkerConfig::default();

    let startup = build_consumer(&config);

    assert!(matches!(startup, Ok(Startup::Disabled)));
}

#[test]
#[serial]
fn test_blank_queue_is_disabled_without_aws_credentials() {
    clear_credentials();
    let mut config = WorkerConfig::default();
    config.queue.name = Some("   ".to_string());

    assert!(matches!(build_consumer(&config), Ok(Startup::Disabled)));
}

#[test]
#[serial]
fn test_configured_queue_without_credentials_fails() {
    clear_credentials();
    let mut config = WorkerConfig::default();
    config.queue.name = Some("member-created".to_string());

    assert!(matches!(
        build_consumer(&config),
        Err(StartupError::Transport(_))
    ));
}

#[test]
#[serial]
fn test_configured_queue_with_credentials_is_ready() {
    clear_credentials();
    let mut config = WorkerConfig::default();
    config.queue.name = Some("member-created".to_string());
    config.aws.access_key_id = Some("AKIDEXAMPLE".to_string());
    config.aws.secret_access_key = Some("secret".to_string());

    assert!(matches!(build_consumer(&config), Ok(Startup::Ready(_))));
}
