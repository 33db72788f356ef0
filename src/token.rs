//! Access token acquisition
//!
//! The streaming provider only accepts short-lived session tokens minted by
//! the application backend. [`TokenProvider`] fetches one with bounded
//! retries: each attempt is limited by a per-attempt timeout, and failed
//! attempts are followed by a linear backoff of `base_delay * attempt`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{Result, SessionError};

/// Path of the token mint endpoint on the application host
pub const TOKEN_PATH: &str = "/api/get-access-token";

/// Bearer token for the streaming provider
///
/// The `Debug` implementation does not print the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(<{} bytes>)", self.0.len())
    }
}

/// Retry policy for the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub base_delay: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(30),
            base_delay: Duration::from_secs(1),
        }
    }
}

impl TokenPolicy {
    /// Delay after the failed attempt number `attempt` (1-based)
    ///
    /// # Examples
    ///
    /// ```
    /// use aihuman::token::TokenPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = TokenPolicy::default();
    /// assert_eq!(policy.backoff_for(1), Duration::from_secs(1));
    /// assert_eq!(policy.backoff_for(2), Duration::from_secs(2));
    /// ```
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Anything that can produce a provider access token
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Returns a fresh token.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TokenUnavailable`] when no token could be
    /// obtained.
    async fn get_token(&self) -> Result<AccessToken>;
}

/// HTTP client for the token mint endpoint
#[derive(Debug, Clone)]
pub struct TokenProvider {
    client: Client,
    endpoint: String,
    policy: TokenPolicy,
}

impl TokenProvider {
    /// Creates a provider for the application host `app_base`
    ///
    /// # Examples
    ///
    /// ```
    /// use aihuman::token::{TokenPolicy, TokenProvider};
    ///
    /// let provider = TokenProvider::new("http://localhost:3000/", TokenPolicy::default()).unwrap();
    /// assert_eq!(provider.endpoint(), "http://localhost:3000/api/get-access-token");
    /// ```
    pub fn new(app_base: &str, policy: TokenPolicy) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("aihuman/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SessionError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", app_base.trim_end_matches('/'), TOKEN_PATH),
            policy,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn policy(&self) -> TokenPolicy {
        self.policy
    }

    async fn attempt(&self) -> Result<AccessToken> {
        let request = async {
            let response = self.client.post(&self.endpoint).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(SessionError::Provider(format!(
                    "token endpoint returned {}",
                    status
                ))
                .into());
            }

            let token = response.text().await?.trim().to_string();
            if token.is_empty() {
                return Err(
                    SessionError::Provider("token endpoint returned an empty body".to_string())
                        .into(),
                );
            }
            Ok(AccessToken::new(token))
        };

        match tokio::time::timeout(self.policy.attempt_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Provider(format!(
                "token request timed out after {:?}",
                self.policy.attempt_timeout
            ))
            .into()),
        }
    }
}

#[async_trait]
impl AccessTokenSource for TokenProvider {
    async fn get_token(&self) -> Result<AccessToken> {
        let max_attempts = self.policy.max_attempts;

        for attempt in 1..=max_attempts {
            match self.attempt().await {
                Ok(token) => {
                    tracing::debug!(attempt, "Access token acquired");
                    return Ok(token);
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "Access token attempt failed"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.policy.backoff_for(attempt)).await;
                    }
                }
            }
        }

        tracing::error!(attempts = max_attempts, "Access token unavailable");
        Err(SessionError::TokenUnavailable {
            attempts: max_attempts,
        }
        .into())
    }
}
