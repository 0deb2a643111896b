use std::time::Duration;
use tokio::time::Instant;

/// Duration before expiry within which a token is preemptively renewed.
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(300);

/// An issued access token. Immutable once constructed; refresh replaces the
/// whole value atomically.
#[derive(Debug, Clone)]
pub struct Token {
    access_token: String,
    token_type: String,
    expires_in: Duration,
    issued_at: Instant,
}

impl Token {
    pub fn new(
        access_token: String,
        token_type: String,
        expires_in: Duration,
        issued_at: Instant,
    ) -> Self {
        Self {
            access_token,
            token_type,
            expires_in,
            issued_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// The instant the token stops being accepted.
    pub fn expires_at(&self) -> Instant {
        self.issued_at + self.expires_in
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at()
    }

    /// Whether the token has entered the refresh buffer. A token in the
    /// buffer is still usable until it actually expires.
    pub fn needs_refresh(&self, now: Instant, buffer: Duration) -> bool {
        match self.expires_at().checked_sub(buffer) {
            Some(threshold) => now >= threshold,
            None => true,
        }
    }

    /// The `Authorization` header value: `<scheme> <token>`.
    pub fn authorization_value(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_in_secs: u64, issued_at: Instant) -> Token {
        Token::new(
            "abc123".to_string(),
            "Bearer".to_string(),
            Duration::from_secs(expires_in_secs),
            issued_at,
        )
    }

    #[tokio::test]
    async fn fresh_token_is_usable_and_outside_buffer() {
        let now = Instant::now();
        let token = token(3600, now);
        assert!(!token.is_expired(now));
        assert!(!token.needs_refresh(now, DEFAULT_REFRESH_BUFFER));
    }

    #[tokio::test]
    async fn token_inside_buffer_needs_refresh_but_is_not_expired() {
        let now = Instant::now();
        let token = token(3600, now);
        let later = now + Duration::from_secs(3400);
        assert!(token.needs_refresh(later, DEFAULT_REFRESH_BUFFER));
        assert!(!token.is_expired(later));
    }

    #[tokio::test]
    async fn token_expires_exactly_at_lifetime() {
        let now = Instant::now();
        let token = token(60, now);
        assert!(!token.is_expired(now + Duration::from_secs(59)));
        assert!(token.is_expired(now + Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn short_lived_token_is_born_inside_the_buffer() {
        let now = Instant::now();
        let token = token(120, now);
        assert!(token.needs_refresh(now, DEFAULT_REFRESH_BUFFER));
    }

    #[tokio::test]
    async fn authorization_value_joins_scheme_and_token() {
        let now = Instant::now();
        assert_eq!(token(60, now).authorization_value(), "Bearer abc123");
    }
}
