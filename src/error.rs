//! Error types for aihuman
//!
//! This module defines the error taxonomy of the session controller and its
//! collaborators, using `thiserror` for ergonomic error handling. Fallible
//! functions return [`Result`], an `anyhow` alias; callers that need to
//! classify a failure downcast to [`SessionError`].

use thiserror::Error;

/// Main error type for aihuman operations
///
/// Variants map onto the failure classes of a session: fatal start failures
/// (`TokenUnavailable`, `SessionStart`), non-fatal in-session failures
/// (`Command`, `EmptyText`, `Capture`), persistence and document extraction
/// failures, and the usual infrastructure conversions.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The token endpoint failed on every attempt
    #[error("Access token unavailable after {attempts} attempt(s)")]
    TokenUnavailable {
        /// Number of attempts that were made
        attempts: u32,
    },

    /// The avatar could not be created or voice chat could not be opened
    #[error("Session start failed: {0}")]
    SessionStart(String),

    /// A speak, interrupt or mode-switch command failed
    #[error("Command failed: {0}")]
    Command(String),

    /// Speak was called with empty or whitespace-only text
    #[error("Text to speak must not be empty")]
    EmptyText,

    /// Microphone access or recorder failure
    #[error("Voice capture failed: {0}")]
    Capture(String),

    /// The project save endpoint rejected the request or was unreachable
    #[error("Save failed: {0}")]
    Save(String),

    /// Document extraction failed upstream or returned an unusable body
    #[error("Document processing failed (status {status}): {details}")]
    DocumentProcessing {
        /// HTTP status reported by the extraction endpoint
        status: u16,
        /// Upstream details, as text
        details: String,
    },

    /// Operation is not allowed in the current lifecycle state
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        /// Operation that was attempted
        operation: &'static str,
        /// Lifecycle state at the time of the call
        state: String,
    },

    /// No published project exists under the given name
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    /// Streaming provider control-plane errors
    #[error("Streaming provider error: {0}")]
    Provider(String),

    /// No bearer credential could be resolved
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

impl SessionError {
    /// Returns `true` for errors that abort a session start.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TokenUnavailable { .. } | Self::SessionStart(_) | Self::InvalidState { .. }
        )
    }
}

/// Result type alias for aihuman operations
///
/// Uses `anyhow::Error` so context can be attached on the way up;
/// [`SessionError`] values are recovered with `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;
