//! Cached provider credentials
//!
//! Some chat providers exchange long-lived app credentials for a
//! short-lived access token. The cache is an explicit value with an
//! explicit refresh point, constructed once and refreshed on demand.

use chrono::{DateTime, Duration, Utc};

/// Margin subtracted from the reported lifetime so a token is refreshed
/// before the provider actually rejects it
const EXPIRY_MARGIN_SECS: i64 = 60;

/// An access token with an explicit refresh lifecycle
///
/// `lifetime_secs` is `None` for static credentials with no expiry.
#[derive(Debug, Clone)]
pub struct CachedToken {
    token: String,
    last_refreshed: DateTime<Utc>,
    lifetime_secs: Option<i64>,
}

impl CachedToken {
    /// Cache a freshly issued token
    pub fn new(token: impl Into<String>, lifetime_secs: i64, now: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            last_refreshed: now,
            lifetime_secs: Some(lifetime_secs),
        }
    }

    /// A static credential that never goes stale (plain API keys)
    pub fn permanent(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            last_refreshed: Utc::now(),
            lifetime_secs: None,
        }
    }

    /// The bearer token value
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn last_refreshed(&self) -> DateTime<Utc> {
        self.last_refreshed
    }

    /// Whether the token needs refreshing at `now`
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let Some(lifetime_secs) = self.lifetime_secs else {
            return false;
        };
        let usable = Duration::try_seconds((lifetime_secs - EXPIRY_MARGIN_SECS).max(0))
            .unwrap_or(Duration::MAX);
        match self.last_refreshed.checked_add_signed(usable) {
            Some(deadline) => now >= deadline,
            // A lifetime past the end of representable time cannot lapse
            None => false,
        }
    }

    /// Refresh the token if it has gone stale, using the provided issuer
    ///
    /// The issuer is only invoked when a refresh is actually needed.
    pub fn refresh_if_stale<F>(&mut self, now: DateTime<Utc>, issue: F) -> crate::error::Result<&str>
    where
        F: FnOnce() -> crate::error::Result<(String, i64)>,
    {
        if self.is_stale(now) {
            let (token, lifetime_secs) = issue()?;
            self.token = token;
            self.lifetime_secs = Some(lifetime_secs);
            self.last_refreshed = now;
        }
        Ok(&self.token)
    }
}
