//! aihuman - interactive AI human avatar sessions
//!
//! This library drives live sessions with a streaming avatar: it mints the
//! access token, runs the session lifecycle under a soft and a hard time
//! limit, saves the project manually or when time runs out, and turns
//! uploaded documents into knowledge-base text.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Lifecycle controller, dual timer and voice capture
//! - `token`: Access token provider with retry and backoff
//! - `streaming`: Streaming client abstraction and the REST adapter
//! - `persistence`: Manual and automatic project saves
//! - `documents`: Document text extraction and response normalization
//! - `server`: The document extraction proxy route
//! - `project`: Published project lookup
//! - `embed`: Embed snippets for published projects
//! - `credentials`: Bearer token resolution and storage
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use aihuman::config::StreamingConfig;
//! use aihuman::session::{SessionConfig, SessionController, TerminationReason};
//! use aihuman::streaming::rest::RestStreamingFactory;
//! use aihuman::token::{TokenPolicy, TokenProvider};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let tokens = TokenProvider::new("https://humanaiapp.com", TokenPolicy::default())?;
//!     let factory = RestStreamingFactory::new(&StreamingConfig::default())?;
//!     let controller = SessionController::builder(Arc::new(tokens), Arc::new(factory)).build();
//!
//!     let config = SessionConfig {
//!         avatar_id: "Anna_public_3_20240108".to_string(),
//!         ..SessionConfig::default()
//!     };
//!     controller.start(config).await?;
//!     controller.speak("Hello!").await?;
//!     controller.end(TerminationReason::User).await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod documents;
pub mod embed;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod project;
pub mod server;
pub mod session;
pub mod streaming;
pub mod token;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, SessionError};
pub use session::{SessionConfig, SessionController, SessionEvent, TerminationReason};

#[cfg(test)]
pub mod test_utils;
