use crate::token::DEFAULT_REFRESH_BUFFER;
use std::time::Duration;
use syncline_core::SyncError;
use syncline_retry::RetryPolicy;

/// Configuration for the credential manager.
pub struct CredentialConfig {
    pub(crate) base_url: String,
    pub(crate) email: String,
    pub(crate) password: String,
    pub(crate) refresh_buffer: Duration,
    pub(crate) retry: RetryPolicy,
}

impl CredentialConfig {
    /// Creates a new builder.
    pub fn builder() -> CredentialConfigBuilder {
        CredentialConfigBuilder::new()
    }
}

/// Builder for [`CredentialConfig`].
pub struct CredentialConfigBuilder {
    base_url: Option<String>,
    email: Option<String>,
    password: Option<String>,
    refresh_buffer: Duration,
    retry: Option<RetryPolicy>,
}

impl Default for CredentialConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialConfigBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            email: None,
            password: None,
            refresh_buffer: DEFAULT_REFRESH_BUFFER,
            retry: None,
        }
    }

    /// Base URL of the API; the login endpoint is `<base>/auth/login`.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Overrides the 300 s refresh buffer.
    pub fn refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    /// Overrides the tightened acquisition retry policy
    /// ([`RetryPolicy::credential`]).
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Builds the config, rejecting missing or empty credentials.
    pub fn build(self) -> Result<CredentialConfig, SyncError> {
        let require = |field: Option<String>, name: &str| -> Result<String, SyncError> {
            match field {
                Some(value) if !value.is_empty() => Ok(value),
                _ => Err(SyncError::ConfigurationInvalid {
                    message: format!("credential config requires {name}"),
                }),
            }
        };

        Ok(CredentialConfig {
            base_url: require(self.base_url, "a base URL")?
                .trim_end_matches('/')
                .to_string(),
            email: require(self.email, "an email")?,
            password: require(self.password, "a password")?,
            refresh_buffer: self.refresh_buffer,
            retry: self.retry.unwrap_or_else(RetryPolicy::credential),
        })
    }
}
