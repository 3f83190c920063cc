//! Worker configuration.
//!
//! Sources are layered with the `config` crate; later sources override
//! earlier ones:
//!
//! 1. `/etc/member-events/worker.yaml` (optional)
//! 2. `./config/worker.yaml` (optional)
//! 3. The file named by `MEW_CONFIG_FILE` (required when set)
//! 4. Environment variables prefixed `MEW__`, e.g. `MEW__QUEUE__NAME=member-created`
//!
//! Every field carries a serde default, so an unconfigured environment yields
//! a valid configuration with the consumer disabled (no queue name).

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use member_queue::{AwsSqsConfig, ReceiveSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "MEW_CONFIG_FILE";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "MEW";

/// Longest accepted lifetime for dedup and idempotency entries (7 days)
pub const MAX_TTL_MINUTES: u64 = 7 * 24 * 60;

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Queue consumption settings
    pub queue: QueueConfig,

    /// Feature flags
    pub features: FeatureConfig,

    /// Retry policy for verification email sends
    pub retry: RetryConfig,

    /// Idempotency cache settings
    pub idempotency: IdempotencyConfig,

    /// AWS SQS connection settings
    pub aws: AwsConfig,

    /// Member settings API used to send emails
    pub member_service: MemberServiceConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Time allowed for the consumer to stop after a shutdown signal
    pub shutdown_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            features: FeatureConfig::default(),
            retry: RetryConfig::default(),
            idempotency: IdempotencyConfig::default(),
            aws: AwsConfig::default(),
            member_service: MemberServiceConfig::default(),
            logging: LoggingConfig::default(),
            shutdown_timeout_seconds: 30,
        }
    }
}

/// Queue consumption configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue to consume; absent or blank disables the consumer
    pub name: Option<String>,

    /// Messages requested per receive (1-10)
    pub max_messages: u32,

    /// Long-poll wait per receive in seconds (0-20)
    pub wait_time_seconds: u64,

    /// Pause after an empty receive in seconds
    pub empty_poll_delay_seconds: u64,

    /// How long yielded message content is remembered for duplicate suppression
    pub dedup_ttl_minutes: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: None,
            max_messages: 10,
            wait_time_seconds: 20,
            empty_poll_delay_seconds: 180,
            dedup_ttl_minutes: 60,
        }
    }
}

/// Feature flags
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Send a signup verification email for each new member
    pub send_verification_email: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            send_verification_email: true,
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total send attempts per message, including the first
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 250,
            max_delay_ms: 2000,
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

/// Idempotency cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// How long a successful send suppresses repeats for the same member
    pub ttl_minutes: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self { ttl_minutes: 60 }
    }
}

/// AWS connection configuration
///
/// Credentials fall back to `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`
/// when not set here.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Endpoint override, e.g. `http://localhost:4566` for LocalStack
    pub endpoint: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            endpoint: None,
        }
    }
}

impl std::fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsConfig")
            .field("region", &self.region)
            .field(
                "access_key_id",
                &self.access_key_id.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Member settings API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberServiceConfig {
    /// Base URL of the member settings API
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for MemberServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_seconds: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "member_events_worker=info,member_queue=info".to_string(),
            json_format: false,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from the standard locations and the environment
    ///
    /// `explicit_path` is typically the value of [`CONFIG_FILE_ENV`]; when
    /// given, the file must exist.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder()
            .add_source(
                ::config::File::with_name("/etc/member-events/worker")
                    .required(false)
                    .format(::config::FileFormat::Yaml),
            )
            .add_source(
                ::config::File::with_name("config/worker")
                    .required(false)
                    .format(::config::FileFormat::Yaml),
            );

        if let Some(path) = explicit_path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .required(true)
                    .format(::config::FileFormat::Yaml),
            );
        }

        let config = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load configuration, honouring [`CONFIG_FILE_ENV`]
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let explicit = std::env::var(CONFIG_FILE_ENV)
            .ok()
            .filter(|path| !path.trim().is_empty());

        Self::load(explicit.as_deref().map(Path::new))
    }

    /// Validate the configuration, reporting every problem at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if !(1..=10).contains(&self.queue.max_messages) {
            errors.push(format!(
                "queue.max_messages must be between 1 and 10 (got {})",
                self.queue.max_messages
            ));
        }
        if self.queue.wait_time_seconds > 20 {
            errors.push(format!(
                "queue.wait_time_seconds must not exceed 20 (got {})",
                self.queue.wait_time_seconds
            ));
        }
        if !(1..=MAX_TTL_MINUTES).contains(&self.queue.dedup_ttl_minutes) {
            errors.push(format!(
                "queue.dedup_ttl_minutes must be between 1 and {} (got {})",
                MAX_TTL_MINUTES, self.queue.dedup_ttl_minutes
            ));
        }

        if self.retry.max_attempts == 0 {
            errors.push("retry.max_attempts must be at least 1".to_string());
        }
        if self.retry.backoff_multiplier < 1.0 {
            errors.push(format!(
                "retry.backoff_multiplier must be at least 1.0 (got {})",
                self.retry.backoff_multiplier
            ));
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            errors.push("retry.max_delay_ms must not be less than retry.initial_delay_ms".to_string());
        }

        if !(1..=MAX_TTL_MINUTES).contains(&self.idempotency.ttl_minutes) {
            errors.push(format!(
                "idempotency.ttl_minutes must be between 1 and {} (got {})",
                MAX_TTL_MINUTES, self.idempotency.ttl_minutes
            ));
        }

        if self.aws.region.trim().is_empty() {
            errors.push("aws.region must not be empty".to_string());
        }

        if self.member_service.timeout_seconds == 0 {
            errors.push("member_service.timeout_seconds must be greater than 0".to_string());
        }

        if self.shutdown_timeout_seconds == 0 {
            errors.push("shutdown_timeout_seconds must be greater than 0".to_string());
        }

        if self.member_service.base_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "member_service.base_url".to_string(),
            });
        }
        match url::Url::parse(&self.member_service.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(format!(
                "member_service.base_url must use http or https (got {})",
                url.scheme()
            )),
            Err(e) => errors.push(format!("member_service.base_url is not a valid URL: {}", e)),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                message: errors.join("; "),
            })
        }
    }

    /// Queue to consume, or `None` when absent or blank
    pub fn queue_name(&self) -> Option<&str> {
        self.queue
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Receive settings for the queue client registry
    pub fn receive_settings(&self) -> ReceiveSettings {
        ReceiveSettings {
            max_messages: self.queue.max_messages,
            wait_time: Duration::from_secs(self.queue.wait_time_seconds),
            empty_poll_delay: Duration::from_secs(self.queue.empty_poll_delay_seconds),
        }
    }

    /// Lifetime of dedup cache entries, capped at [`MAX_TTL_MINUTES`]
    pub fn dedup_ttl(&self) -> Duration {
        ttl_from_minutes(self.queue.dedup_ttl_minutes)
    }

    /// Lifetime of idempotency cache entries, capped at [`MAX_TTL_MINUTES`]
    pub fn idempotency_ttl(&self) -> Duration {
        ttl_from_minutes(self.idempotency.ttl_minutes)
    }

    /// Retry policy for verification email sends
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
            self.retry.backoff_multiplier,
        );

        if self.retry.use_jitter {
            policy
        } else {
            policy.without_jitter()
        }
    }

    /// SQS transport configuration
    pub fn aws_sqs_config(&self) -> AwsSqsConfig {
        AwsSqsConfig {
            region: self.aws.region.clone(),
            access_key_id: self.aws.access_key_id.clone(),
            secret_access_key: self.aws.secret_access_key.clone(),
            endpoint: self.aws.endpoint.clone(),
        }
    }

    /// Grace period for the consumer after a shutdown signal
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

fn ttl_from_minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes.min(MAX_TTL_MINUTES) * 60)
}
