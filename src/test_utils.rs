//! Test utilities for aihuman
//!
//! Temporary files, error assertions, a ready-to-use session configuration
//! and an in-process microphone.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::error::{Result, SessionError};
use crate::session::{AudioInput, AudioRecorder, Entitlements, SessionConfig};
use crate::streaming::AudioClip;

/// Create a temporary directory for testing
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Create a test file with the given content
///
/// # Panics
///
/// Panics if file creation or writing fails
pub fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T>(result: Result<T>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// A valid session configuration for the base tier
pub fn test_session_config() -> SessionConfig {
    SessionConfig {
        project_name: "Demo".to_string(),
        niche: "education".to_string(),
        avatar_id: "Anna_public_3_20240108".to_string(),
        knowledge_base: "You are a friendly tutor.".to_string(),
        language: "en".to_string(),
        emotion: "friendly".to_string(),
        entitlements: Entitlements::default(),
        ..SessionConfig::default()
    }
}

/// Microphone fake that counts live hardware tracks
///
/// Every recorder opened through it holds one track until released; the
/// shared counter shows how many are still running.
#[derive(Debug, Clone, Default)]
pub struct FakeAudioInput {
    live_tracks: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
    fail_open: bool,
    clip: Vec<u8>,
}

impl FakeAudioInput {
    /// Input whose recordings yield `clip`
    pub fn with_clip(clip: &[u8]) -> Self {
        Self {
            clip: clip.to_vec(),
            ..Self::default()
        }
    }

    /// Input that refuses microphone access
    pub fn denied() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn live_tracks(&self) -> usize {
        self.live_tracks.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioInput for FakeAudioInput {
    async fn open(&self) -> Result<Box<dyn AudioRecorder>> {
        if self.fail_open {
            return Err(SessionError::Capture("permission denied".to_string()).into());
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live_tracks.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeRecorder {
            live_tracks: self.live_tracks.clone(),
            clip: self.clip.clone(),
            released: false,
        }))
    }
}

struct FakeRecorder {
    live_tracks: Arc<AtomicUsize>,
    clip: Vec<u8>,
    released: bool,
}

impl AudioRecorder for FakeRecorder {
    fn finish(&mut self) -> Result<AudioClip> {
        Ok(AudioClip::wav(std::mem::take(&mut self.clip)))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.live_tracks.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn active_tracks(&self) -> usize {
        usize::from(!self.released)
    }
}

impl Drop for FakeRecorder {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_file() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "test.txt", "content");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "content");
    }

    #[test]
    #[should_panic(expected = "does not contain")]
    fn test_assert_error_contains_wrong_message() {
        let result: Result<()> = Err(SessionError::Config("different error".to_string()).into());
        assert_error_contains(result, "not present");
    }

    #[test]
    fn test_session_config_is_valid() {
        assert!(test_session_config().validate().is_ok());
    }

    #[tokio::test]
    async fn test_fake_audio_input_tracks() {
        let input = FakeAudioInput::with_clip(b"RIFF");
        let mut recorder = input.open().await.unwrap();
        assert_eq!(input.live_tracks(), 1);
        assert_eq!(recorder.finish().unwrap().data.len(), 4);
        recorder.release();
        recorder.release();
        assert_eq!(input.live_tracks(), 0);
    }
}
