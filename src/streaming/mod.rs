//! Streaming avatar client abstraction
//!
//! This module defines the [`StreamingClient`] trait that wraps one live
//! avatar session of the third-party streaming provider, together with the
//! request/response types the session controller exchanges with it.
//! Concrete implementations live in submodules:
//!
//! - [`rest::RestStreamingClient`] -- drives the provider's REST control
//!   plane (create, start, task, interrupt, stop).
//! - [`fake::FakeStreamingClient`] -- in-process fake used in tests
//!   (cfg(test) only).
//!
//! # Events
//!
//! The provider SDK is callback driven. Here the callbacks are modelled as a
//! stream of [`StreamingEvent`] values pushed into the [`EventSender`] handed
//! to [`StreamingClientFactory::connect`]. The controller owns the receiving
//! end and is the only consumer.

use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Result, SessionError};
use crate::session::SessionConfig;
use crate::token::AccessToken;

pub mod rest;

#[cfg(test)]
pub mod fake;

/// Rendering quality tier requested from the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvatarQuality {
    Low,
    Medium,
    #[default]
    High,
}

impl AvatarQuality {
    /// Wire representation used by the provider and the project backend
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for AvatarQuality {
    type Err = SessionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(SessionError::Config(format!(
                "Invalid avatar quality: {}. Must be one of: low, medium, high",
                other
            ))),
        }
    }
}

impl std::fmt::Display for AvatarQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Voice parameters for the avatar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    /// Provider voice identifier; the avatar default is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,

    /// Speaking rate multiplier
    pub rate: f32,

    /// Emotion tag (e.g. "Friendly", "Serious")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
}

/// Parameters for the provider's "create and start avatar" call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartAvatarRequest {
    pub quality: AvatarQuality,
    pub avatar_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_base: Option<String>,
    pub voice: VoiceSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub video_codec: String,
    pub disable_idle_timeout: bool,
}

impl StartAvatarRequest {
    /// Builds the request for a session configuration
    ///
    /// Empty optional strings are omitted so the provider applies its own
    /// defaults. Idle timeout is always disabled; the session timers own
    /// expiry.
    pub fn from_config(config: &SessionConfig) -> Self {
        fn non_empty(value: &str) -> Option<String> {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }

        Self {
            quality: config.quality,
            avatar_name: config.avatar_id.clone(),
            knowledge_base: non_empty(&config.knowledge_base),
            voice: VoiceSettings {
                voice_id: config.voice_id.as_deref().and_then(non_empty),
                rate: config.voice_rate,
                emotion: non_empty(&config.emotion),
            },
            language: non_empty(&config.language),
            video_codec: config.video_codec.clone(),
            disable_idle_timeout: true,
        }
    }
}

/// Provider reply to a successful avatar start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartAvatarResponse {
    pub session_id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Handle to the live media stream announced by the provider
///
/// The controller never decodes media; it only holds the descriptor while
/// the session is active and drops it on teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    pub session_id: String,
    pub url: Option<String>,
    pub access_token: Option<String>,
}

/// How a speak task is interpreted by the avatar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Send the text to the avatar's language model and speak the reply
    Talk,
    /// Speak the text verbatim
    Repeat,
}

/// Whether a task resolves immediately or after the utterance completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    Sync,
    Async,
}

/// A speak task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakRequest {
    pub text: String,
    pub task_type: TaskType,
    pub task_mode: TaskMode,
}

impl SpeakRequest {
    /// A synchronous talk task
    pub fn talk(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            task_type: TaskType::Talk,
            task_mode: TaskMode::Sync,
        }
    }
}

/// Options for opening the voice channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoiceChatOptions {
    pub use_silence_prompt: bool,
}

/// A recorded audio message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub mime_type: String,
    pub data: Bytes,
}

impl AudioClip {
    pub fn wav(data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: "audio/wav".to_string(),
            data: data.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Events emitted by the streaming client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamingEvent {
    /// The media stream is ready to be attached
    StreamReady(MediaStream),
    AvatarStartTalking,
    AvatarStopTalking,
    /// Voice activity detected on the user's side
    UserStart,
    UserStop,
    /// The provider closed the session
    StreamDisconnected,
}

/// Sending half of the event channel given to a client at construction
pub type EventSender = mpsc::UnboundedSender<StreamingEvent>;

/// One live avatar session at the streaming provider.
///
/// Every method is an awaited network round trip. Implementations must be
/// safe to call concurrently: the controller may issue `stop_avatar` while a
/// `speak` is still in flight.
#[async_trait::async_trait]
pub trait StreamingClient: Send + Sync {
    /// Creates the avatar session and starts streaming.
    async fn create_start_avatar(&self, request: &StartAvatarRequest)
        -> Result<StartAvatarResponse>;

    /// Opens the two-way voice channel.
    async fn start_voice_chat(&self, options: VoiceChatOptions) -> Result<()>;

    /// Closes the voice channel, leaving the session in text mode.
    async fn close_voice_chat(&self) -> Result<()>;

    /// Sends a speak task.
    async fn speak(&self, request: &SpeakRequest) -> Result<()>;

    /// Cancels the current avatar utterance.
    async fn interrupt(&self) -> Result<()>;

    /// Sends a recorded voice message.
    async fn send_voice_message(&self, clip: AudioClip) -> Result<()>;

    /// Stops the avatar session at the provider.
    async fn stop_avatar(&self) -> Result<()>;
}

/// Constructs streaming clients bound to an access token.
pub trait StreamingClientFactory: Send + Sync {
    /// Builds a client for `token` that reports its events on `events`.
    ///
    /// Construction must not perform network I/O; the first round trip is
    /// [`StreamingClient::create_start_avatar`].
    fn connect(&self, token: &AccessToken, events: EventSender)
        -> Result<Arc<dyn StreamingClient>>;
}
