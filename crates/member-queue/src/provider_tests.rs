//! Tests for provider limits and default settings.

use super::*;

#[test]
fn test_sqs_limits() {
    assert_eq!(ProviderType::AwsSqs.max_batch_size(), 10);
    assert_eq!(ProviderType::AwsSqs.max_wait_time(), Duration::from_secs(20));
}

#[test]
fn test_in_memory_allows_larger_batches() {
    assert!(ProviderType::InMemory.max_batch_size() > ProviderType::AwsSqs.max_batch_size());
}

#[test]
fn test_receive_settings_default_to_long_poll_with_cool_down() {
    let settings = ReceiveSettings::default();

    assert_eq!(settings.max_messages, 10);
    assert_eq!(settings.wait_time, Duration::from_secs(20));
    assert_eq!(settings.empty_poll_delay, Duration::from_secs(180));
}

#[test]
fn test_aws_config_defaults_to_env_credentials() {
    let config = AwsSqsConfig::default();

    assert_eq!(config.region, "us-east-1");
    assert!(config.access_key_id.is_none());
    assert!(config.secret_access_key.is_none());
    assert!(config.endpoint.is_none());
}
