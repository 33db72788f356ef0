//! Session data model
//!
//! Configuration, lifecycle states, termination reasons and the events and
//! snapshots through which callers observe a session.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::persistence::SaveNotice;
use crate::streaming::AvatarQuality;

/// Plan entitlements of the signed-in user
///
/// Only used to resolve the soft session duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlements {
    /// Highest purchased tier (extended sessions)
    #[serde(default)]
    pub top_tier: bool,

    /// Base product
    #[serde(default)]
    pub front_end: bool,
}

/// Per-session configuration
///
/// Read-only while a session is live. A new value (for example with an
/// updated knowledge base) is used by the next session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub project_name: String,

    #[serde(default)]
    pub niche: String,

    /// Avatar or template identifier
    pub avatar_id: String,

    /// Free text, a URL, or text extracted from a document
    #[serde(default)]
    pub knowledge_base: String,

    /// Spoken language code
    #[serde(default)]
    pub language: String,

    #[serde(default)]
    pub voice_id: Option<String>,

    /// Voice emotion tag
    #[serde(default)]
    pub emotion: String,

    #[serde(default = "default_voice_rate")]
    pub voice_rate: f32,

    #[serde(default)]
    pub quality: AvatarQuality,

    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default)]
    pub entitlements: Entitlements,
}

fn default_voice_rate() -> f32 {
    1.5
}

fn default_video_codec() -> String {
    "h264".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            project_name: String::new(),
            niche: String::new(),
            avatar_id: String::new(),
            knowledge_base: String::new(),
            language: String::new(),
            voice_id: None,
            emotion: String::new(),
            voice_rate: default_voice_rate(),
            quality: AvatarQuality::default(),
            video_codec: default_video_codec(),
            entitlements: Entitlements::default(),
        }
    }
}

impl SessionConfig {
    /// Loads a project definition from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Returns a copy with the knowledge base replaced
    pub fn with_knowledge_base(&self, knowledge_base: impl Into<String>) -> Self {
        Self {
            knowledge_base: knowledge_base.into(),
            ..self.clone()
        }
    }

    /// Checks the fields a session cannot start without
    pub fn validate(&self) -> Result<()> {
        if self.avatar_id.trim().is_empty() {
            return Err(SessionError::Config("avatar_id cannot be empty".to_string()).into());
        }

        if !(self.voice_rate > 0.0 && self.voice_rate <= 4.0) {
            return Err(SessionError::Config(format!(
                "voice_rate must be in (0, 4], got {}",
                self.voice_rate
            ))
            .into());
        }

        if self.video_codec.trim().is_empty() {
            return Err(SessionError::Config("video_codec cannot be empty".to_string()).into());
        }

        Ok(())
    }
}

/// Lifecycle of a session
///
/// Transitions only move forward:
/// `Idle -> Starting -> Active -> Ending -> Ended`. Failures before the
/// session is live jump straight to `Ended`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Idle,
    Starting,
    Active,
    Ending,
    Ended,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Ending => "ending",
            Self::Ended => "ended",
        }
    }

    /// `true` once termination has begun
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ending | Self::Ended)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interaction mode of a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    Text,
    #[default]
    Voice,
}

impl InteractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
        }
    }
}

impl FromStr for InteractionMode {
    type Err = SessionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "text_mode" => Ok(Self::Text),
            "voice" | "voice_mode" => Ok(Self::Voice),
            other => Err(SessionError::Config(format!(
                "Invalid interaction mode: {}. Must be one of: text, voice",
                other
            ))),
        }
    }
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What ended a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    User,
    SoftTimeout,
    HardTimeout,
    RemoteDisconnect,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::SoftTimeout => "soft-timeout",
            Self::HardTimeout => "hard-timeout",
            Self::RemoteDisconnect => "remote-disconnect",
        }
    }

    /// Timer-triggered endings auto-save the project
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::SoftTimeout | Self::HardTimeout)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events published by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Start completed; the session is live
    Started { session_id: String },
    StreamReady,
    AvatarTalking(bool),
    UserTalking(bool),
    ModeChanged(InteractionMode),
    CaptureChanged(bool),
    /// A save finished; carries the message to show
    Notice(SaveNotice),
    /// Emitted exactly once per session
    Ended { reason: TerminationReason },
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: LifecycleState,
    pub mode: InteractionMode,
    pub session_id: Option<String>,
    pub stream_ready: bool,
    pub responding: bool,
    pub user_talking: bool,
    pub capturing: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub reason: Option<TerminationReason>,
}
