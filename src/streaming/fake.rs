//! In-process fake streaming client for controller tests
//!
//! [`FakeStreamingFactory::new`] returns the factory to wire into the code
//! under test together with a [`FakeStreamingHandle`]. From the test side the
//! handle can:
//!
//! - inspect every call the controller made: `handle.calls()`
//! - push provider events: `handle.emit(StreamingEvent::StreamDisconnected)`
//! - check which token the client was constructed with: `handle.token()`
//!
//! Failures are scripted up front through [`FakeBehavior`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::error::{Result, SessionError};
use crate::streaming::{
    AudioClip, EventSender, MediaStream, SpeakRequest, StartAvatarRequest, StartAvatarResponse,
    StreamingClient, StreamingClientFactory, StreamingEvent, VoiceChatOptions,
};
use crate::token::AccessToken;

/// Scripted outcomes for the fake client
#[derive(Debug, Clone)]
pub struct FakeBehavior {
    pub fail_create: bool,
    pub fail_voice_chat: bool,
    pub fail_speak: bool,
    pub fail_interrupt: bool,
    pub fail_send_voice: bool,
    pub fail_stop: bool,
    /// Emit `StreamReady` from inside `create_start_avatar`
    pub emit_ready: bool,
    /// Hold `create_start_avatar` until the test notifies
    pub create_gate: Option<Arc<Notify>>,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            fail_create: false,
            fail_voice_chat: false,
            fail_speak: false,
            fail_interrupt: false,
            fail_send_voice: false,
            fail_stop: false,
            emit_ready: true,
            create_gate: None,
        }
    }
}

/// A call recorded by the fake client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    CreateStartAvatar(String),
    StartVoiceChat,
    CloseVoiceChat,
    Speak(String),
    Interrupt,
    SendVoiceMessage(usize),
    StopAvatar,
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<FakeCall>>,
    events: Mutex<Option<EventSender>>,
    token: Mutex<Option<String>>,
    connects: AtomicUsize,
}

impl Shared {
    fn record(&self, call: FakeCall) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Factory producing [`FakeStreamingClient`]s
pub struct FakeStreamingFactory {
    behavior: FakeBehavior,
    shared: Arc<Shared>,
}

impl FakeStreamingFactory {
    /// Creates a `(FakeStreamingFactory, FakeStreamingHandle)` pair
    pub fn new(behavior: FakeBehavior) -> (Self, FakeStreamingHandle) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                behavior,
                shared: shared.clone(),
            },
            FakeStreamingHandle { shared },
        )
    }
}

impl StreamingClientFactory for FakeStreamingFactory {
    fn connect(
        &self,
        token: &AccessToken,
        events: EventSender,
    ) -> Result<Arc<dyn StreamingClient>> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        *self.shared.token.lock().unwrap() = Some(token.as_str().to_string());
        *self.shared.events.lock().unwrap() = Some(events.clone());
        Ok(Arc::new(FakeStreamingClient {
            behavior: self.behavior.clone(),
            shared: self.shared.clone(),
            events,
        }))
    }
}

/// Test-side view of the fake
#[derive(Clone)]
pub struct FakeStreamingHandle {
    shared: Arc<Shared>,
}

impl FakeStreamingHandle {
    pub fn calls(&self) -> Vec<FakeCall> {
        self.shared.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls matching `predicate`
    pub fn count(&self, predicate: impl Fn(&FakeCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> Option<String> {
        self.shared.token.lock().unwrap().clone()
    }

    /// Pushes a provider event; returns `false` if no client was connected
    /// or the controller dropped the receiver
    pub fn emit(&self, event: StreamingEvent) -> bool {
        match self.shared.events.lock().unwrap().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

/// In-process [`StreamingClient`]
pub struct FakeStreamingClient {
    behavior: FakeBehavior,
    shared: Arc<Shared>,
    events: EventSender,
}

fn scripted(fail: bool, what: &str) -> Result<()> {
    if fail {
        Err(SessionError::Provider(format!("scripted {} failure", what)).into())
    } else {
        Ok(())
    }
}

#[async_trait::async_trait]
impl StreamingClient for FakeStreamingClient {
    async fn create_start_avatar(
        &self,
        request: &StartAvatarRequest,
    ) -> Result<StartAvatarResponse> {
        if let Some(gate) = &self.behavior.create_gate {
            gate.notified().await;
        }
        self.shared
            .record(FakeCall::CreateStartAvatar(request.avatar_name.clone()));
        scripted(self.behavior.fail_create, "create")?;

        let response = StartAvatarResponse {
            session_id: "fake-session".to_string(),
            url: Some("wss://media.example/fake-session".to_string()),
            access_token: None,
        };
        if self.behavior.emit_ready {
            let _ = self.events.send(StreamingEvent::StreamReady(MediaStream {
                session_id: response.session_id.clone(),
                url: response.url.clone(),
                access_token: None,
            }));
        }
        Ok(response)
    }

    async fn start_voice_chat(&self, _options: VoiceChatOptions) -> Result<()> {
        self.shared.record(FakeCall::StartVoiceChat);
        scripted(self.behavior.fail_voice_chat, "voice chat")
    }

    async fn close_voice_chat(&self) -> Result<()> {
        self.shared.record(FakeCall::CloseVoiceChat);
        Ok(())
    }

    async fn speak(&self, request: &SpeakRequest) -> Result<()> {
        self.shared.record(FakeCall::Speak(request.text.clone()));
        scripted(self.behavior.fail_speak, "speak")
    }

    async fn interrupt(&self) -> Result<()> {
        self.shared.record(FakeCall::Interrupt);
        scripted(self.behavior.fail_interrupt, "interrupt")
    }

    async fn send_voice_message(&self, clip: AudioClip) -> Result<()> {
        self.shared
            .record(FakeCall::SendVoiceMessage(clip.data.len()));
        scripted(self.behavior.fail_send_voice, "send voice")
    }

    async fn stop_avatar(&self) -> Result<()> {
        self.shared.record(FakeCall::StopAvatar);
        scripted(self.behavior.fail_stop, "stop")
    }
}
