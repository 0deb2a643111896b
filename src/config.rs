//! Worker configuration, loaded from the environment.

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use syncline_core::SyncError;
use syncline_ratelimit::{RateLimiter, RateLimiterConfig};
use syncline_retry::RetryPolicy;

/// Output format of the structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// All worker knobs. Every field can be overridden through a
/// `SYNC_`-prefixed environment variable (e.g. `SYNC_BASE_URL`,
/// `SYNC_MAX_PARALLEL_SYNCS`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub base_url: String,
    pub email: String,
    pub password: String,
    pub fetch_timeout_ms: u64,
    pub sync_timeout_ms: u64,
    pub max_parallel_syncs: usize,
    pub page_size: u32,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter_ms: u64,
    pub rate_limit_capacity: usize,
    pub rate_limit_window_ms: u64,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            email: String::new(),
            password: String::new(),
            fetch_timeout_ms: 5000,
            sync_timeout_ms: 5000,
            max_parallel_syncs: 5,
            page_size: 100,
            retry_max_attempts: 5,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 16_000,
            retry_jitter_ms: 250,
            rate_limit_capacity: 10,
            rate_limit_window_ms: 60_000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: "sqlite::memory:".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Loads defaults, overlays `SYNC_*` environment variables, and
    /// validates the result.
    pub fn from_env() -> Result<Self, SyncError> {
        let config: WorkerConfig = Figment::from(Serialized::defaults(WorkerConfig::default()))
            .merge(Env::prefixed("SYNC_"))
            .extract()
            .map_err(|err| SyncError::ConfigurationInvalid {
                message: err.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Enforces the documented constraints.
    pub fn validate(&self) -> Result<(), SyncError> {
        fn invalid(message: String) -> Result<(), SyncError> {
            Err(SyncError::ConfigurationInvalid { message })
        }

        if self.base_url.is_empty() {
            return invalid("SYNC_BASE_URL is required".into());
        }
        if self.email.is_empty() || self.password.is_empty() {
            return invalid("SYNC_EMAIL and SYNC_PASSWORD are required".into());
        }
        if self.max_parallel_syncs == 0 || self.max_parallel_syncs > 10 {
            return invalid(format!(
                "max_parallel_syncs must be within 1..=10, got {}",
                self.max_parallel_syncs
            ));
        }
        if self.retry_max_attempts == 0 || self.retry_max_attempts > 20 {
            return invalid(format!(
                "retry_max_attempts must be within 1..=20, got {}",
                self.retry_max_attempts
            ));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return invalid(format!(
                "retry_base_delay_ms ({}) must not exceed retry_max_delay_ms ({})",
                self.retry_base_delay_ms, self.retry_max_delay_ms
            ));
        }
        if self.rate_limit_capacity == 0 {
            return invalid("rate_limit_capacity must be at least 1".into());
        }
        if self.rate_limit_window_ms == 0 {
            return invalid("rate_limit_window_ms must be positive".into());
        }
        if self.page_size == 0 {
            return invalid("page_size must be at least 1".into());
        }
        Ok(())
    }

    /// The API retry policy these settings describe.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(self.retry_max_attempts)
            .base_delay(Duration::from_millis(self.retry_base_delay_ms))
            .max_delay(Duration::from_millis(self.retry_max_delay_ms))
            .jitter(Duration::from_millis(self.retry_jitter_ms))
            .name("api")
            .build()
    }

    /// The outbound rate limiter these settings describe.
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiterConfig::builder()
            .capacity(self.rate_limit_capacity)
            .window(Duration::from_millis(self.rate_limit_window_ms))
            .name("api")
            .build()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> WorkerConfig {
        WorkerConfig {
            base_url: "https://api.example.com".into(),
            email: "worker@example.com".into(),
            password: "hunter2".into(),
            ..WorkerConfig::default()
        }
    }

    #[test]
    fn defaults_with_credentials_validate() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn parallelism_is_capped_at_ten() {
        let mut config = valid();
        config.max_parallel_syncs = 11;
        assert!(config.validate().is_err());
        config.max_parallel_syncs = 10;
        assert!(config.validate().is_ok());
        config.max_parallel_syncs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn retry_attempts_are_capped_at_twenty() {
        let mut config = valid();
        config.retry_max_attempts = 21;
        assert!(config.validate().is_err());
    }

    #[test]
    fn base_delay_must_not_exceed_max_delay() {
        let mut config = valid();
        config.retry_base_delay_ms = 20_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SYNC_BASE_URL", "https://api.example.com");
            jail.set_env("SYNC_EMAIL", "worker@example.com");
            jail.set_env("SYNC_PASSWORD", "hunter2");
            jail.set_env("SYNC_MAX_PARALLEL_SYNCS", "3");
            jail.set_env("SYNC_LOG_FORMAT", "json");

            let config = WorkerConfig::from_env().expect("config loads");
            assert_eq!(config.max_parallel_syncs, 3);
            assert_eq!(config.log_format, LogFormat::Json);
            // Untouched fields keep their defaults.
            assert_eq!(config.page_size, 100);
            Ok(())
        });
    }

    #[test]
    fn env_constraint_violations_fail_loading() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SYNC_BASE_URL", "https://api.example.com");
            jail.set_env("SYNC_EMAIL", "worker@example.com");
            jail.set_env("SYNC_PASSWORD", "hunter2");
            jail.set_env("SYNC_MAX_PARALLEL_SYNCS", "50");

            assert!(WorkerConfig::from_env().is_err());
            Ok(())
        });
    }
}
