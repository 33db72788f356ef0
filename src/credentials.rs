//! Bearer credentials for the backend
//!
//! The web application keeps the bearer token in an `authToken` cookie and
//! the full login response (token plus user record) in local storage. On the
//! command line the login response is kept in the OS keyring instead, under
//! the `aihuman` service.
//!
//! Resolution order used by [`resolve_bearer`]:
//!
//! 1. a token given explicitly (flag or `AIHUMAN_AUTH_TOKEN`)
//! 2. the stored login record
//!
//! Entitlements always come from the stored login record when one exists.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SessionError};
use crate::session::Entitlements;

/// Name of the cookie carrying the bearer token in the web application
pub const AUTH_COOKIE: &str = "authToken";

const KEYRING_SERVICE: &str = "aihuman";
const KEYRING_USER: &str = "login";

/// Extracts the bearer token from a `Cookie` header value
///
/// # Examples
///
/// ```
/// use aihuman::credentials::token_from_cookie_header;
///
/// assert_eq!(
///     token_from_cookie_header("theme=dark; authToken=abc123; lang=en"),
///     Some("abc123".to_string())
/// );
/// assert_eq!(token_from_cookie_header("theme=dark"), None);
/// ```
pub fn token_from_cookie_header(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| name.trim() == AUTH_COOKIE)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// User part of a login response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginUser {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub oto_1: Option<Value>,
    #[serde(default)]
    pub fe: Option<Value>,
}

/// Login response as stored after sign-in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginRecord {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub user: Option<LoginUser>,
}

fn flag_set(value: &Option<Value>) -> bool {
    matches!(value.as_ref().and_then(Value::as_i64), Some(1))
}

impl LoginRecord {
    /// Plan entitlements; no user record means the base tier
    pub fn entitlements(&self) -> Entitlements {
        match &self.user {
            Some(user) => Entitlements {
                top_tier: flag_set(&user.oto_1),
                front_end: flag_set(&user.fe),
            },
            None => Entitlements::default(),
        }
    }

    /// Parses a stored record, falling back to an empty one when malformed
    ///
    /// # Examples
    ///
    /// ```
    /// use aihuman::credentials::LoginRecord;
    ///
    /// let record = LoginRecord::parse_lenient(r#"{"token":"t","user":{"oto_1":1}}"#);
    /// assert!(record.entitlements().top_tier);
    ///
    /// let broken = LoginRecord::parse_lenient("{not json");
    /// assert!(!broken.entitlements().top_tier);
    /// ```
    pub fn parse_lenient(json: &str) -> Self {
        serde_json::from_str(json).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Ignoring malformed login record");
            Self::default()
        })
    }
}

/// Keyring-backed storage for the login record
#[derive(Debug, Clone)]
pub struct CredentialStore {
    service: String,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
        }
    }
}

impl CredentialStore {
    /// Store under a custom keyring service name
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        Ok(keyring::Entry::new(&self.service, KEYRING_USER).map_err(SessionError::Keyring)?)
    }

    /// Persists `record`, replacing any previous login
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Keyring`] if the OS credential store rejects
    /// the write.
    pub fn save_login(&self, record: &LoginRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.entry()?
            .set_password(&json)
            .map_err(SessionError::Keyring)?;
        tracing::debug!(service = %self.service, "Login record stored");
        Ok(())
    }

    /// Loads the stored login record, `None` when nobody is signed in
    pub fn load_login(&self) -> Result<Option<LoginRecord>> {
        match self.entry()?.get_password() {
            Ok(json) => Ok(Some(LoginRecord::parse_lenient(&json))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(SessionError::Keyring(e).into()),
        }
    }

    /// Removes the stored login; a no-op when there is none
    pub fn clear_login(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(SessionError::Keyring(e).into()),
        }
    }
}

/// A usable bearer token plus the entitlements that go with it
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCredentials {
    pub bearer: String,
    pub entitlements: Entitlements,
}

/// Picks the bearer token to use
///
/// # Errors
///
/// Returns [`SessionError::MissingCredentials`] when neither source has a
/// token.
pub fn resolve_bearer(explicit: Option<&str>, login: Option<&LoginRecord>) -> Result<ResolvedCredentials> {
    let entitlements = login.map(LoginRecord::entitlements).unwrap_or_default();

    let bearer = explicit
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .or_else(|| {
            login
                .map(|record| record.token.trim().to_string())
                .filter(|token| !token.is_empty())
        })
        .ok_or_else(|| {
            SessionError::MissingCredentials(
                "no auth token given and no stored login; run `aihuman login` or pass --auth-token"
                    .to_string(),
            )
        })?;

    Ok(ResolvedCredentials {
        bearer,
        entitlements,
    })
}
