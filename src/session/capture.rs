//! Local microphone capture
//!
//! The controller records voice messages through the [`AudioInput`] and
//! [`AudioRecorder`] traits so that the hardware side can be replaced in
//! tests. A recorder owns one or more hardware tracks; [`AudioRecorder::release`]
//! must stop all of them and be safe to call more than once.

use async_trait::async_trait;

use crate::error::{Result, SessionError};
use crate::streaming::AudioClip;

/// Source of microphone recordings
#[async_trait]
pub trait AudioInput: Send + Sync {
    /// Acquires the microphone and starts recording.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Capture`] when permission is denied or no
    /// device is available.
    async fn open(&self) -> Result<Box<dyn AudioRecorder>>;
}

/// An in-progress recording
pub trait AudioRecorder: Send {
    /// Stops recording and returns everything buffered so far.
    fn finish(&mut self) -> Result<AudioClip>;

    /// Stops the underlying hardware tracks.
    fn release(&mut self);

    /// Number of hardware tracks still running
    fn active_tracks(&self) -> usize;
}

/// Audio input for hosts without a microphone
///
/// Every `open` fails with a capture error; the session itself is unaffected.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAudioInput;

#[async_trait]
impl AudioInput for NoAudioInput {
    async fn open(&self) -> Result<Box<dyn AudioRecorder>> {
        Err(SessionError::Capture("no audio input device is configured".to_string()).into())
    }
}

/// Finishes a recording and releases its tracks, whatever the outcome
pub(crate) fn finish_and_release(mut recorder: Box<dyn AudioRecorder>) -> Result<AudioClip> {
    let clip = recorder.finish();
    recorder.release();
    clip
}
