//! Embeddable widget snippets
//!
//! A published project can be embedded in third-party pages through an
//! iframe pointing at its public preview. The snippet also replaces the
//! widget with an expiry notice once the hard session limit has passed.

use std::time::Duration;

use url::Url;

use crate::error::{Result, SessionError};
use crate::session::timer::HARD_DURATION;

const CONTAINER_ID: &str = "ai-human-container";
const EXPIRED_NOTICE: &str = "Session expired. Please refresh to start a new session.";

/// Layout of the embedded widget
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbedOptions {
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    /// Delay before the widget is replaced by the expiry notice
    pub expire_after: Duration,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            width: 500,
            height: 400,
            scale: 0.8,
            expire_after: HARD_DURATION,
        }
    }
}

/// Public preview URL of a project
///
/// # Examples
///
/// ```
/// use aihuman::embed::preview_url;
///
/// let url = preview_url("https://humanaiapp.com", "Math Tutor").unwrap();
/// assert_eq!(url.as_str(), "https://humanaiapp.com/app/Math%20Tutor");
/// ```
pub fn preview_url(app_base: &str, project_name: &str) -> Result<Url> {
    let mut url = Url::parse(app_base)
        .map_err(|e| SessionError::Config(format!("Invalid app base URL {}: {}", app_base, e)))?;
    url.path_segments_mut()
        .map_err(|_| SessionError::Config(format!("App base cannot be a base: {}", app_base)))?
        .pop_if_empty()
        .extend(["app", project_name]);
    Ok(url)
}

/// Preview URL with the widget flags set
pub fn embed_url(app_base: &str, project_name: &str) -> Result<Url> {
    let mut url = preview_url(app_base, project_name)?;
    url.query_pairs_mut()
        .append_pair("hideNotifications", "true")
        .append_pair("disablePreview", "true");
    Ok(url)
}

/// HTML snippet embedding `project_name`
pub fn embed_snippet(app_base: &str, project_name: &str, options: &EmbedOptions) -> Result<String> {
    let src = embed_url(app_base, project_name)?;

    Ok(format!(
        r#"<!-- AI Human Embed Code -->
<div id="{id}">
    <iframe
        src="{src}"
        width="{width}"
        height="{height}"
        style="transform: scale({scale}); transform-origin: 0 0; border: 1px solid #ddd;"
        allow="microphone; camera; display-capture; fullscreen; notifications"
        sandbox="allow-same-origin allow-scripts allow-popups allow-forms allow-downloads allow-modals"
        referrerpolicy="no-referrer"
    ></iframe>
</div>
<script>
    setTimeout(() => {{
        const container = document.getElementById('{id}');
        if (container) {{
            container.innerHTML = '<div style="padding: 20px; text-align: center; background: #f5f5f5; border: 1px solid #ddd;">{notice}</div>';
        }}
    }}, {millis});
</script>"#,
        id = CONTAINER_ID,
        src = src,
        width = options.width,
        height = options.height,
        scale = options.scale,
        notice = EXPIRED_NOTICE,
        millis = options.expire_after.as_millis(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_url_flags() {
        let url = embed_url("https://humanaiapp.com/", "demo").unwrap();
        assert_eq!(
            url.as_str(),
            "https://humanaiapp.com/app/demo?hideNotifications=true&disablePreview=true"
        );
    }

    #[test]
    fn test_name_is_percent_encoded() {
        let url = preview_url("https://humanaiapp.com", "a/b?c").unwrap();
        assert_eq!(url.as_str(), "https://humanaiapp.com/app/a%2Fb%3Fc");
    }

    #[test]
    fn test_snippet_defaults() {
        let snippet = embed_snippet("https://humanaiapp.com", "Math Tutor", &EmbedOptions::default()).unwrap();
        assert!(snippet.contains(r#"<div id="ai-human-container">"#));
        assert!(snippet.contains(
            r#"src="https://humanaiapp.com/app/Math%20Tutor?hideNotifications=true&disablePreview=true""#
        ));
        assert!(snippet.contains(r#"width="500""#));
        assert!(snippet.contains("scale(0.8)"));
        assert!(snippet.contains("}, 480000);"));
        assert!(snippet.contains(EXPIRED_NOTICE));
    }

    #[test]
    fn test_invalid_base() {
        assert!(preview_url("not a url", "demo").is_err());
    }
}
