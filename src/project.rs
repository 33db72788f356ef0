//! Published project lookup
//!
//! A published project is reachable by name on the public preview page.
//! [`ProjectDirectory`] resolves the name against the backend and turns the
//! stored project into a [`SessionConfig`] ready to start.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{Result, SessionError};
use crate::session::{Entitlements, SessionConfig};

/// A project as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedProject {
    /// Avatar template id
    pub template: String,
    #[serde(default)]
    pub knowledge_base: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub emotion: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub niche: Option<String>,
    /// Owner id; numeric or string depending on the record age
    #[serde(default)]
    pub user_id: Option<Value>,
}

impl PublishedProject {
    pub fn owner_id(&self) -> Option<String> {
        match self.user_id.as_ref()? {
            Value::String(id) => Some(id.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Session configuration for this project
    ///
    /// An unknown quality tier falls back to the default.
    pub fn into_session_config(self, project_name: &str, entitlements: Entitlements) -> SessionConfig {
        let quality = self
            .quality
            .as_deref()
            .and_then(|q| q.parse().ok())
            .unwrap_or_default();

        SessionConfig {
            project_name: project_name.to_string(),
            niche: self.niche.unwrap_or_default(),
            avatar_id: self.template,
            knowledge_base: self.knowledge_base,
            language: self.language,
            voice_id: self.voice.filter(|voice| !voice.trim().is_empty()),
            emotion: self.emotion,
            quality,
            entitlements,
            ..SessionConfig::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    data: Option<PublishedProject>,
}

/// Client of the project lookup endpoint
#[derive(Debug, Clone)]
pub struct ProjectDirectory {
    client: Client,
    api_base: Url,
}

impl ProjectDirectory {
    pub fn new(api_base: &str) -> Result<Self> {
        let api_base = Url::parse(api_base)
            .map_err(|e| SessionError::Config(format!("Invalid API base URL {}: {}", api_base, e)))?;
        let client = Client::builder()
            .user_agent(concat!("aihuman/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SessionError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, api_base })
    }

    /// URL of the lookup for `name`, with the name percent-encoded
    ///
    /// # Examples
    ///
    /// ```
    /// use aihuman::project::ProjectDirectory;
    ///
    /// let directory = ProjectDirectory::new("https://api.example.com").unwrap();
    /// assert_eq!(
    ///     directory.lookup_url("My Tutor/v2").unwrap().as_str(),
    ///     "https://api.example.com/api/get_avatar_name/My%20Tutor%2Fv2"
    /// );
    /// ```
    pub fn lookup_url(&self, name: &str) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| SessionError::Config(format!("API base cannot be a base: {}", self.api_base)))?
            .pop_if_empty()
            .extend(["api", "get_avatar_name", name]);
        Ok(url)
    }

    /// Fetches the project published as `name`
    ///
    /// # Errors
    ///
    /// [`SessionError::ProjectNotFound`] when the backend has no such
    /// project, [`SessionError::Provider`] for any other failure.
    pub async fn lookup(&self, name: &str) -> Result<PublishedProject> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::ProjectNotFound("(empty name)".to_string()).into());
        }

        let url = self.lookup_url(name)?;
        tracing::debug!(%url, "Looking up published project");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SessionError::ProjectNotFound(name.to_string()).into());
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SessionError::Provider(format!(
                "Project lookup returned {}: {}",
                status, error_text
            ))
            .into());
        }

        let body: LookupResponse = response.json().await.map_err(|e| {
            SessionError::Provider(format!("Failed to parse project lookup response: {}", e))
        })?;
        body.data
            .ok_or_else(|| SessionError::ProjectNotFound(name.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::AvatarQuality;
    use serde_json::json;

    #[test]
    fn test_into_session_config() {
        let project: PublishedProject = serde_json::from_value(json!({
            "template": "Anna_public",
            "knowledge_base": "kb",
            "voice": "",
            "emotion": "soothing",
            "language": "fr",
            "quality": "medium",
            "user_id": 42
        }))
        .unwrap();
        assert_eq!(project.owner_id().as_deref(), Some("42"));

        let config = project.into_session_config("Tutor", Entitlements::default());
        assert_eq!(config.project_name, "Tutor");
        assert_eq!(config.avatar_id, "Anna_public");
        assert_eq!(config.voice_id, None);
        assert_eq!(config.quality, AvatarQuality::Medium);
        assert_eq!(config.language, "fr");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_quality_defaults_to_high() {
        let project: PublishedProject =
            serde_json::from_value(json!({"template": "t", "quality": "ultra"})).unwrap();
        let config = project.into_session_config("p", Entitlements::default());
        assert_eq!(config.quality, AvatarQuality::High);
    }

    #[test]
    fn test_lookup_url_keeps_base_path() {
        let directory = ProjectDirectory::new("http://localhost:8080/backend/").unwrap();
        assert_eq!(
            directory.lookup_url("demo").unwrap().as_str(),
            "http://localhost:8080/backend/api/get_avatar_name/demo"
        );
    }
}
