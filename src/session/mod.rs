//! Avatar session lifecycle
//!
//! - [`controller`] -- the [`SessionController`] state machine
//! - [`timer`] -- soft and hard session timers
//! - [`capture`] -- microphone recording seam

pub mod capture;
pub mod controller;
pub mod timer;
mod types;

pub use capture::{AudioInput, AudioRecorder, NoAudioInput};
pub use controller::{SessionController, SessionControllerBuilder};
pub use timer::{DualTimer, TimerDurations, TimerState};
pub use types::{
    Entitlements, InteractionMode, LifecycleState, SessionConfig, SessionEvent, SessionSnapshot,
    TerminationReason,
};
