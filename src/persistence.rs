//! Project persistence
//!
//! Saving turns the current session configuration into a [`ProjectRecord`]
//! and posts it to the backend's project endpoint. [`PersistenceGateway`]
//! is what the controller talks to; it distinguishes a manual save, which
//! reports failures back to the user, from the auto-save that runs when a
//! timer ends the session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::session::SessionConfig;

/// Path of the save endpoint on the API host
pub const SAVE_PATH: &str = "/api/save-avatar-project";

const SAVE_SUCCESS_MESSAGE: &str = "Project saved successfully!";
const AUTO_SAVE_MESSAGE: &str = "Session ended. Check the Manage Projects section to view your saved project. If the project name already exists, please create a new project with a unique name.";
const SAVE_FAILED_MESSAGE: &str = "Failed to save project";

/// Body of a save request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub project_name: String,
    pub niche: String,
    pub template: String,
    pub knowledge_base: String,
    pub language: String,
    pub emotion: String,
    pub quality: String,
    pub video_encoding: String,
}

impl From<&SessionConfig> for ProjectRecord {
    fn from(config: &SessionConfig) -> Self {
        Self {
            project_name: config.project_name.clone(),
            niche: config.niche.clone(),
            template: config.avatar_id.clone(),
            knowledge_base: config.knowledge_base.clone(),
            language: config.language.clone(),
            emotion: config.emotion.clone(),
            quality: config.quality.as_str().to_string(),
            video_encoding: config.video_codec.to_lowercase(),
        }
    }
}

/// Who asked for a save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    /// The user pressed save
    Manual,
    /// A timer expired
    Auto,
}

/// Outcome of a successful save, carrying the text shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveNotice {
    Saved,
    AutoSaved,
}

impl SaveNotice {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Saved => SAVE_SUCCESS_MESSAGE,
            Self::AutoSaved => AUTO_SAVE_MESSAGE,
        }
    }
}

impl std::fmt::Display for SaveNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Storage backend for project records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Persists `record`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Save`] with a user-facing message.
    async fn save_project(&self, record: &ProjectRecord) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct SaveFailure {
    message: Option<String>,
}

/// [`ProjectStore`] backed by the HTTP API
#[derive(Debug, Clone)]
pub struct HttpProjectStore {
    client: Client,
    endpoint: String,
    bearer: String,
}

impl HttpProjectStore {
    /// Creates a store for the API host `api_base`, authenticating with `bearer`
    ///
    /// Each save request is abandoned after `timeout`.
    pub fn new(api_base: &str, bearer: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("aihuman/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", api_base.trim_end_matches('/'), SAVE_PATH),
            bearer: bearer.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ProjectStore for HttpProjectStore {
    async fn save_project(&self, record: &ProjectRecord) -> Result<()> {
        tracing::debug!(project = %record.project_name, "Saving project");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.bearer)
            .json(record)
            .send()
            .await
            .map_err(|e| {
                SessionError::Save(format!(
                    "An error occurred while saving the project: {}",
                    e
                ))
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<SaveFailure>(&body)
            .ok()
            .and_then(|failure| failure.message)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| SAVE_FAILED_MESSAGE.to_string());

        tracing::warn!(%status, %message, "Project save rejected");
        Err(SessionError::Save(message).into())
    }
}

/// Persistence entry point used by the session controller
#[derive(Clone)]
pub struct PersistenceGateway {
    store: Arc<dyn ProjectStore>,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn ProjectStore>) -> Self {
        Self { store }
    }

    /// Saves the project described by `config`
    ///
    /// Failures are returned in both cases; it is up to the caller whether
    /// they reach the user.
    pub async fn save(&self, config: &SessionConfig, kind: SaveKind) -> Result<SaveNotice> {
        let record = ProjectRecord::from(config);
        self.store.save_project(&record).await?;

        tracing::info!(project = %record.project_name, ?kind, "Project saved");
        Ok(match kind {
            SaveKind::Manual => SaveNotice::Saved,
            SaveKind::Auto => SaveNotice::AutoSaved,
        })
    }
}

impl std::fmt::Debug for PersistenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceGateway").finish_non_exhaustive()
    }
}
