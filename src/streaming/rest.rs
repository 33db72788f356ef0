//! REST control-plane client for the streaming provider
//!
//! Drives a session through the provider's HTTP API:
//!
//! - `POST /v1/streaming.new` creates the session and returns its media
//!   endpoint
//! - `POST /v1/streaming.start` starts it
//! - `POST /v1/streaming.task` makes the avatar speak
//! - `POST /v1/streaming.interrupt` cuts the current utterance short
//! - `POST /v1/streaming.stop` closes the session
//!
//! Every call authenticates with the access token minted by the backend.
//! The media transport itself (and with it the voice channel) is outside
//! this client: voice chat calls fail with a command error and callers
//! are expected to stay in text mode.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::StreamingConfig;
use crate::error::{Result, SessionError};
use crate::streaming::{
    AudioClip, EventSender, MediaStream, SpeakRequest, StartAvatarRequest, StartAvatarResponse,
    StreamingClient, StreamingClientFactory, StreamingEvent, TaskMode, TaskType, VoiceChatOptions,
    VoiceSettings,
};
use crate::token::AccessToken;

const API_VERSION: &str = "v2";

/// Factory producing [`RestStreamingClient`]s that share one HTTP client
#[derive(Debug, Clone)]
pub struct RestStreamingFactory {
    client: Client,
    api_base: String,
}

impl RestStreamingFactory {
    pub fn new(config: &StreamingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("aihuman/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SessionError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }
}

impl StreamingClientFactory for RestStreamingFactory {
    fn connect(&self, token: &AccessToken, events: EventSender) -> Result<Arc<dyn StreamingClient>> {
        Ok(Arc::new(RestStreamingClient {
            client: self.client.clone(),
            api_base: self.api_base.clone(),
            token: token.clone(),
            session_id: RwLock::new(None),
            events,
        }))
    }
}

#[derive(Debug, Serialize)]
struct NewSessionRequest<'a> {
    quality: &'a str,
    avatar_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    knowledge_base: Option<&'a str>,
    voice: &'a VoiceSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    video_encoding: String,
    version: &'static str,
    disable_idle_timeout: bool,
}

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    session_id: &'a str,
}

#[derive(Debug, Serialize)]
struct TaskRequest<'a> {
    session_id: &'a str,
    text: &'a str,
    task_type: TaskType,
    task_mode: TaskMode,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

/// One provider session driven over REST
pub struct RestStreamingClient {
    client: Client,
    api_base: String,
    token: AccessToken,
    session_id: RwLock<Option<String>>,
    events: EventSender,
}

impl std::fmt::Debug for RestStreamingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStreamingClient")
            .field("api_base", &self.api_base)
            .field("session_id", &self.current_session().ok().flatten())
            .finish_non_exhaustive()
    }
}

impl RestStreamingClient {
    fn current_session(&self) -> Result<Option<String>> {
        let guard = self.session_id.read().map_err(|_| {
            SessionError::Provider("Failed to acquire read lock on session".to_string())
        })?;
        Ok(guard.clone())
    }

    fn require_session(&self, operation: &str) -> Result<String> {
        self.current_session()?.ok_or_else(|| {
            SessionError::Command(format!("{}: avatar session has not been started", operation))
                .into()
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}/v1/{}", self.api_base, path);
        tracing::debug!(%url, "Streaming provider request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token.as_str())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Streaming request {} failed: {}", path, e);
                SessionError::Provider(format!("{} request failed: {}", path, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Envelope<serde_json::Value>>(&error_text)
                .ok()
                .and_then(|envelope| envelope.message)
                .unwrap_or(error_text);
            tracing::error!("Streaming provider returned {} for {}: {}", status, path, message);
            return Err(SessionError::Provider(format!(
                "{} returned {}: {}",
                path, status, message
            ))
            .into());
        }

        Ok(response)
    }
}

#[async_trait]
impl StreamingClient for RestStreamingClient {
    async fn create_start_avatar(&self, request: &StartAvatarRequest) -> Result<StartAvatarResponse> {
        let body = NewSessionRequest {
            quality: request.quality.as_str(),
            avatar_name: &request.avatar_name,
            knowledge_base: request.knowledge_base.as_deref(),
            voice: &request.voice,
            language: request.language.as_deref(),
            video_encoding: request.video_codec.to_uppercase(),
            version: API_VERSION,
            disable_idle_timeout: request.disable_idle_timeout,
        };

        let envelope: Envelope<StartAvatarResponse> = self
            .post("streaming.new", &body)
            .await?
            .json()
            .await
            .map_err(|e| {
                SessionError::Provider(format!("Failed to parse streaming.new response: {}", e))
            })?;
        let session = envelope.data.ok_or_else(|| {
            SessionError::Provider("streaming.new response has no data".to_string())
        })?;

        self.post(
            "streaming.start",
            &SessionRequest {
                session_id: &session.session_id,
            },
        )
        .await?;

        {
            let mut guard = self.session_id.write().map_err(|_| {
                SessionError::Provider("Failed to acquire write lock on session".to_string())
            })?;
            *guard = Some(session.session_id.clone());
        }

        tracing::info!(session_id = %session.session_id, "Avatar session started");
        let _ = self.events.send(StreamingEvent::StreamReady(MediaStream {
            session_id: session.session_id.clone(),
            url: session.url.clone(),
            access_token: session.access_token.clone(),
        }));

        Ok(session)
    }

    async fn start_voice_chat(&self, _options: VoiceChatOptions) -> Result<()> {
        Err(SessionError::Command(
            "voice chat requires a media transport; use text mode".to_string(),
        )
        .into())
    }

    async fn close_voice_chat(&self) -> Result<()> {
        Ok(())
    }

    async fn speak(&self, request: &SpeakRequest) -> Result<()> {
        let session_id = self.require_session("speak")?;
        let _ = self.events.send(StreamingEvent::AvatarStartTalking);
        let result = self
            .post(
                "streaming.task",
                &TaskRequest {
                    session_id: &session_id,
                    text: &request.text,
                    task_type: request.task_type,
                    task_mode: request.task_mode,
                },
            )
            .await;
        let _ = self.events.send(StreamingEvent::AvatarStopTalking);
        result.map(|_| ())
    }

    async fn interrupt(&self) -> Result<()> {
        let session_id = self.require_session("interrupt")?;
        self.post(
            "streaming.interrupt",
            &SessionRequest {
                session_id: &session_id,
            },
        )
        .await?;
        Ok(())
    }

    async fn send_voice_message(&self, _clip: AudioClip) -> Result<()> {
        Err(SessionError::Command(
            "voice messages require a media transport".to_string(),
        )
        .into())
    }

    async fn stop_avatar(&self) -> Result<()> {
        let session_id = {
            let mut guard = self.session_id.write().map_err(|_| {
                SessionError::Provider("Failed to acquire write lock on session".to_string())
            })?;
            guard.take()
        };

        match session_id {
            Some(session_id) => {
                self.post(
                    "streaming.stop",
                    &SessionRequest {
                        session_id: &session_id,
                    },
                )
                .await?;
                tracing::info!(%session_id, "Avatar session stopped");
                Ok(())
            }
            None => Ok(()),
        }
    }
}
