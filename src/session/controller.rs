//! Session lifecycle controller
//!
//! [`SessionController`] owns one avatar session from token acquisition to
//! teardown. It is cheap to clone; all clones drive the same session.
//!
//! # Termination
//!
//! Four things can end a session: the user, the soft timer, the hard timer
//! and the provider dropping the stream. All of them go through
//! [`SessionController::end`], whose first step is an atomic claim. Exactly
//! one caller performs teardown and publishes [`SessionEvent::Ended`]; the
//! others return `false` without side effects.
//!
//! Teardown order:
//!
//! 1. cancel both timers
//! 2. drop the media stream and release every microphone track
//! 3. spawn the auto-save when a timer ended the session
//! 4. stop the avatar (best effort)
//! 5. mark the session `Ended` and publish the event

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::SessionSettings;
use crate::error::{Result, SessionError};
use crate::persistence::{PersistenceGateway, SaveKind, SaveNotice};
use crate::session::capture::{finish_and_release, AudioInput, AudioRecorder, NoAudioInput};
use crate::session::timer::{DualTimer, TimerState};
use crate::session::{
    InteractionMode, LifecycleState, SessionConfig, SessionEvent, SessionSnapshot,
    TerminationReason,
};
use crate::streaming::{
    MediaStream, SpeakRequest, StartAvatarRequest, StreamingClient, StreamingClientFactory,
    StreamingEvent, VoiceChatOptions,
};
use crate::token::AccessTokenSource;

const EVENT_CAPACITY: usize = 64;

/// Everything the controller mutates, behind one lock
#[derive(Default)]
struct SessionHandle {
    state: LifecycleState,
    config: Option<SessionConfig>,
    client: Option<Arc<dyn StreamingClient>>,
    stream: Option<MediaStream>,
    mode: InteractionMode,
    recorder: Option<Box<dyn AudioRecorder>>,
    responding: bool,
    user_talking: bool,
    reason: Option<TerminationReason>,
    timer: Option<DualTimer>,
    pump: Option<JoinHandle<()>>,
    autosave: Option<JoinHandle<()>>,
    session_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
}

impl SessionHandle {
    fn require_active(&self, operation: &'static str) -> Result<()> {
        if self.state == LifecycleState::Active {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state.to_string(),
            }
            .into())
        }
    }

    fn active_client(&self, operation: &'static str) -> Result<Arc<dyn StreamingClient>> {
        self.require_active(operation)?;
        self.client.clone().ok_or_else(|| {
            SessionError::InvalidState {
                operation,
                state: self.state.to_string(),
            }
            .into()
        })
    }
}

struct Inner {
    id: Uuid,
    settings: SessionSettings,
    tokens: Arc<dyn AccessTokenSource>,
    factory: Arc<dyn StreamingClientFactory>,
    audio: Arc<dyn AudioInput>,
    persistence: Option<Arc<PersistenceGateway>>,
    start_claimed: AtomicBool,
    terminated: AtomicBool,
    /// Held by the one save allowed per session, manual or automatic
    save_claimed: AtomicBool,
    handle: Mutex<SessionHandle>,
    events: broadcast::Sender<SessionEvent>,
    stream_ready: Notify,
}

impl Inner {
    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn claim_save(&self) -> bool {
        self.save_claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Builder for [`SessionController`]
pub struct SessionControllerBuilder {
    tokens: Arc<dyn AccessTokenSource>,
    factory: Arc<dyn StreamingClientFactory>,
    settings: SessionSettings,
    audio: Arc<dyn AudioInput>,
    persistence: Option<Arc<PersistenceGateway>>,
}

impl SessionControllerBuilder {
    pub fn new(
        tokens: Arc<dyn AccessTokenSource>,
        factory: Arc<dyn StreamingClientFactory>,
    ) -> Self {
        Self {
            tokens,
            factory,
            settings: SessionSettings::default(),
            audio: Arc::new(NoAudioInput),
            persistence: None,
        }
    }

    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn audio_input(mut self, audio: Arc<dyn AudioInput>) -> Self {
        self.audio = audio;
        self
    }

    /// Enables manual save and the timer auto-save
    pub fn persistence(mut self, gateway: Arc<PersistenceGateway>) -> Self {
        self.persistence = Some(gateway);
        self
    }

    pub fn build(self) -> SessionController {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        SessionController {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                settings: self.settings,
                tokens: self.tokens,
                factory: self.factory,
                audio: self.audio,
                persistence: self.persistence,
                start_claimed: AtomicBool::new(false),
                terminated: AtomicBool::new(false),
                save_claimed: AtomicBool::new(false),
                handle: Mutex::new(SessionHandle::default()),
                events,
                stream_ready: Notify::new(),
            }),
        }
    }
}

/// Controller of a single avatar session
///
/// A controller runs one session; once it has ended, build a new one.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("id", &self.inner.id)
            .field("terminated", &self.inner.terminated.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SessionController {
    pub fn builder(
        tokens: Arc<dyn AccessTokenSource>,
        factory: Arc<dyn StreamingClientFactory>,
    ) -> SessionControllerBuilder {
        SessionControllerBuilder::new(tokens, factory)
    }

    /// Local identifier of this controller, used in logs
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub async fn state(&self) -> LifecycleState {
        self.inner.handle.lock().await.state
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let handle = self.inner.handle.lock().await;
        SessionSnapshot {
            state: handle.state,
            mode: handle.mode,
            session_id: handle.session_id.clone(),
            stream_ready: handle.stream.is_some(),
            responding: handle.responding,
            user_talking: handle.user_talking,
            capturing: handle.recorder.is_some(),
            started_at: handle.started_at,
            reason: handle.reason,
        }
    }

    /// Remaining time on both timers, if they are running
    pub async fn timer_state(&self) -> Option<TimerState> {
        self.inner
            .handle
            .lock()
            .await
            .timer
            .as_ref()
            .map(DualTimer::state)
    }

    pub async fn subscribe_timer(&self) -> Option<watch::Receiver<TimerState>> {
        self.inner
            .handle
            .lock()
            .await
            .timer
            .as_ref()
            .map(DualTimer::subscribe)
    }

    /// Starts the session described by `config`
    ///
    /// On success the session is `Active`, the media stream is ready and, if
    /// enabled, both timers are running.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidState`] unless the controller is idle
    /// - [`SessionError::TokenUnavailable`] when no token could be fetched;
    ///   no streaming client is created
    /// - [`SessionError::SessionStart`] when the avatar or voice chat could
    ///   not be started; the client is stopped
    ///
    /// Every failure leaves the controller `Ended`.
    pub async fn start(&self, config: SessionConfig) -> Result<()> {
        config.validate()?;

        {
            let handle = self.inner.handle.lock().await;
            if handle.state != LifecycleState::Idle
                || self.inner.start_claimed.swap(true, Ordering::SeqCst)
            {
                return Err(SessionError::InvalidState {
                    operation: "start",
                    state: handle.state.to_string(),
                }
                .into());
            }
        }

        tracing::info!(session = %self.inner.id, avatar = %config.avatar_id, "Starting session");

        let token = match self.inner.tokens.get_token().await {
            Ok(token) if !token.is_empty() => token,
            Ok(_) => {
                self.fail_before_connect().await;
                return Err(SessionError::TokenUnavailable { attempts: 1 }.into());
            }
            Err(e) => {
                tracing::error!(session = %self.inner.id, error = %e, "Session start aborted: no access token");
                self.fail_before_connect().await;
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let client = {
            let mut handle = self.inner.handle.lock().await;
            if self.inner.terminated.load(Ordering::SeqCst) {
                return Err(SessionError::SessionStart("session ended during start".to_string()).into());
            }
            let client = match self.inner.factory.connect(&token, tx) {
                Ok(client) => client,
                Err(e) => {
                    drop(handle);
                    return Err(self.abort_start(None, e.to_string()).await);
                }
            };
            handle.state = LifecycleState::Starting;
            handle.config = Some(config.clone());
            handle.client = Some(client.clone());
            handle.pump = Some(tokio::spawn(pump_events(Arc::downgrade(&self.inner), rx)));
            client
        };

        let request = StartAvatarRequest::from_config(&config);
        let response = match client.create_start_avatar(&request).await {
            Ok(response) => response,
            Err(e) => return Err(self.abort_start(Some(client), e.to_string()).await),
        };

        let initial_mode = self.inner.settings.initial_mode;
        if initial_mode == InteractionMode::Voice {
            let options = VoiceChatOptions {
                use_silence_prompt: false,
            };
            if let Err(e) = client.start_voice_chat(options).await {
                return Err(self
                    .abort_start(Some(client), format!("voice chat: {}", e))
                    .await);
            }
        }

        let timeout = self.inner.settings.stream_ready_timeout();
        if tokio::time::timeout(timeout, self.inner.stream_ready.notified())
            .await
            .is_err()
        {
            return Err(self
                .abort_start(
                    Some(client),
                    format!("media stream not ready after {:?}", timeout),
                )
                .await);
        }

        let mut handle = self.inner.handle.lock().await;
        if self.inner.terminated.load(Ordering::SeqCst) {
            drop(handle);
            self.stop_orphaned(client).await;
            return Err(SessionError::SessionStart("session ended during start".to_string()).into());
        }

        handle.state = LifecycleState::Active;
        handle.mode = initial_mode;
        handle.session_id = Some(response.session_id.clone());
        handle.started_at = Some(Utc::now());

        if self.inner.settings.timers_enabled {
            let durations = self
                .inner
                .settings
                .timer_durations(&config.entitlements);
            let weak = Arc::downgrade(&self.inner);
            handle.timer = Some(DualTimer::start(
                durations,
                Box::new(move |reason| {
                    if let Some(inner) = weak.upgrade() {
                        let controller = SessionController { inner };
                        tokio::spawn(async move {
                            controller.end(reason).await;
                        });
                    }
                }),
            ));
        }
        drop(handle);

        tracing::info!(
            session = %self.inner.id,
            session_id = %response.session_id,
            mode = %initial_mode,
            "Session active"
        );
        self.inner.publish(SessionEvent::Started {
            session_id: response.session_id,
        });
        Ok(())
    }

    async fn fail_before_connect(&self) {
        if !self.inner.terminated.swap(true, Ordering::SeqCst) {
            self.inner.handle.lock().await.state = LifecycleState::Ended;
        }
    }

    /// Tears down a half-started session and builds the error to return
    async fn abort_start(
        &self,
        client: Option<Arc<dyn StreamingClient>>,
        details: String,
    ) -> anyhow::Error {
        tracing::error!(session = %self.inner.id, details = %details, "Session start failed");

        if self.inner.terminated.swap(true, Ordering::SeqCst) {
            if let Some(client) = client {
                self.stop_orphaned(client).await;
            }
            return SessionError::SessionStart(details).into();
        }

        let pump = {
            let mut handle = self.inner.handle.lock().await;
            handle.stream = None;
            handle.client = None;
            handle.pump.take()
        };

        if let Some(client) = client {
            if let Err(e) = client.stop_avatar().await {
                tracing::warn!(error = %e, "Failed to stop avatar after start failure");
            }
        }
        if let Some(pump) = pump {
            pump.abort();
        }

        self.inner.handle.lock().await.state = LifecycleState::Ended;
        SessionError::SessionStart(details).into()
    }

    /// Stops a provider session created after end() already ran
    ///
    /// end() may have stopped the client before the provider assigned a
    /// session, which leaves nothing for its stop to act on.
    async fn stop_orphaned(&self, client: Arc<dyn StreamingClient>) {
        if let Err(e) = client.stop_avatar().await {
            tracing::warn!(session = %self.inner.id, error = %e, "Failed to stop avatar created during teardown");
        }
    }

    /// Ends the session
    ///
    /// Returns `true` if this call performed the teardown and `false` if the
    /// session had already been ended by someone else. Never fails: provider
    /// errors while stopping are logged.
    pub async fn end(&self, reason: TerminationReason) -> bool {
        if self.inner.terminated.swap(true, Ordering::SeqCst) {
            tracing::debug!(session = %self.inner.id, reason = %reason, "Session already ending");
            return false;
        }

        tracing::info!(session = %self.inner.id, reason = %reason, "Ending session");

        let (client, config, pump) = {
            let mut handle = self.inner.handle.lock().await;
            let was_started = handle.state != LifecycleState::Idle;
            handle.state = LifecycleState::Ending;
            handle.reason = Some(reason);

            if let Some(timer) = handle.timer.take() {
                timer.cancel();
            }

            handle.stream = None;
            if let Some(mut recorder) = handle.recorder.take() {
                recorder.release();
            }
            handle.user_talking = false;
            handle.responding = false;

            let config = handle.config.clone();
            if was_started && reason.is_timeout() {
                if let (Some(gateway), Some(config)) = (self.inner.persistence.clone(), config.clone()) {
                    if self.inner.claim_save() {
                        handle.autosave = Some(tokio::spawn(auto_save(
                            gateway,
                            config,
                            self.inner.events.clone(),
                        )));
                    } else {
                        tracing::info!(session = %self.inner.id, "Auto-save skipped: project already being saved");
                    }
                }
            }

            (handle.client.take(), config, handle.pump.take())
        };

        if let Some(client) = client {
            if let Err(e) = client.stop_avatar().await {
                tracing::warn!(session = %self.inner.id, error = %e, "Failed to stop avatar");
            }
        }
        if let Some(pump) = pump {
            pump.abort();
        }

        self.inner.handle.lock().await.state = LifecycleState::Ended;
        // Wakes a start() still waiting for the stream
        self.inner.stream_ready.notify_one();

        tracing::info!(
            session = %self.inner.id,
            reason = %reason,
            project = config.as_ref().map(|c| c.project_name.as_str()).unwrap_or(""),
            "Session ended"
        );
        self.inner.publish(SessionEvent::Ended { reason });
        true
    }

    /// Waits for a pending auto-save, if any
    pub async fn wait_for_auto_save(&self) {
        let task = self.inner.handle.lock().await.autosave.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Auto-save task failed");
            }
        }
    }

    /// Saves the project and, on success, ends the session
    ///
    /// At most one save runs per session. A save requested while another is
    /// in flight, or after a timer auto-save, is rejected.
    ///
    /// # Errors
    ///
    /// Save failures are returned and leave the session active.
    pub async fn save(&self) -> Result<SaveNotice> {
        let gateway = self.inner.persistence.clone().ok_or_else(|| {
            SessionError::MissingCredentials("saving requires a signed-in user".to_string())
        })?;

        let config = {
            let handle = self.inner.handle.lock().await;
            handle.require_active("save")?;
            handle.config.clone().ok_or_else(|| {
                SessionError::InvalidState {
                    operation: "save",
                    state: handle.state.to_string(),
                }
            })?
        };

        if !self.inner.claim_save() {
            return Err(SessionError::Save("A save is already in progress".to_string()).into());
        }

        let notice = match gateway.save(&config, SaveKind::Manual).await {
            Ok(notice) => notice,
            Err(e) => {
                self.inner.save_claimed.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        self.end(TerminationReason::User).await;
        Ok(notice)
    }

    /// Makes the avatar say `text`
    ///
    /// # Errors
    ///
    /// [`SessionError::EmptyText`] for blank input, without contacting the
    /// provider. [`SessionError::Command`] if the provider rejects the task;
    /// the session stays active.
    pub async fn speak(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyText.into());
        }

        let client = self.inner.handle.lock().await.active_client("speak")?;
        client
            .speak(&SpeakRequest::talk(text))
            .await
            .map_err(|e| {
                tracing::warn!(session = %self.inner.id, error = %e, "Speak failed");
                SessionError::Command(format!("speak: {}", e))
            })?;
        Ok(())
    }

    /// Interrupts the avatar mid-utterance
    pub async fn interrupt(&self) -> Result<()> {
        let client = self.inner.handle.lock().await.active_client("interrupt")?;
        client.interrupt().await.map_err(|e| {
            tracing::warn!(session = %self.inner.id, error = %e, "Interrupt failed");
            SessionError::Command(format!("interrupt: {}", e))
        })?;
        Ok(())
    }

    /// Switches between text and voice interaction
    ///
    /// Leaving voice mode stops any capture in progress. On failure the mode
    /// is left unchanged.
    pub async fn set_mode(&self, mode: InteractionMode) -> Result<()> {
        let (client, recorder) = {
            let mut handle = self.inner.handle.lock().await;
            let client = handle.active_client("change mode")?;
            if handle.mode == mode {
                return Ok(());
            }
            let recorder = if mode == InteractionMode::Text {
                handle.recorder.take()
            } else {
                None
            };
            (client, recorder)
        };

        if let Some(mut recorder) = recorder {
            recorder.release();
            self.inner.publish(SessionEvent::CaptureChanged(false));
        }

        let result = match mode {
            InteractionMode::Text => client.close_voice_chat().await,
            InteractionMode::Voice => {
                client
                    .start_voice_chat(VoiceChatOptions {
                        use_silence_prompt: false,
                    })
                    .await
            }
        };
        if let Err(e) = result {
            tracing::warn!(session = %self.inner.id, error = %e, to = %mode, "Mode change failed");
            return Err(SessionError::Command(format!("switch to {}: {}", mode, e)).into());
        }

        let mut handle = self.inner.handle.lock().await;
        if handle.state != LifecycleState::Active {
            return Ok(());
        }
        handle.mode = mode;
        drop(handle);

        tracing::debug!(session = %self.inner.id, mode = %mode, "Interaction mode changed");
        self.inner.publish(SessionEvent::ModeChanged(mode));
        Ok(())
    }

    /// Opens the microphone and starts buffering a voice message
    pub async fn start_voice_capture(&self) -> Result<()> {
        {
            let handle = self.inner.handle.lock().await;
            handle.require_active("start voice capture")?;
            if handle.mode != InteractionMode::Voice {
                return Err(SessionError::Capture("voice capture requires voice mode".to_string()).into());
            }
            if handle.recorder.is_some() {
                return Ok(());
            }
        }

        let mut recorder = self.inner.audio.open().await.map_err(|e| {
            tracing::warn!(session = %self.inner.id, error = %e, "Microphone unavailable");
            match e.downcast::<SessionError>() {
                Ok(SessionError::Capture(message)) => SessionError::Capture(message),
                Ok(other) => SessionError::Capture(other.to_string()),
                Err(e) => SessionError::Capture(e.to_string()),
            }
        })?;

        let mut handle = self.inner.handle.lock().await;
        if handle.state != LifecycleState::Active
            || handle.mode != InteractionMode::Voice
            || handle.recorder.is_some()
        {
            recorder.release();
            return Err(SessionError::Capture("session changed while opening the microphone".to_string()).into());
        }
        handle.recorder = Some(recorder);
        drop(handle);

        self.inner.publish(SessionEvent::CaptureChanged(true));
        Ok(())
    }

    /// Stops capture and sends the recorded message
    ///
    /// The microphone is released before the message is sent, whatever the
    /// outcome of the send. Does nothing when no capture is running.
    pub async fn stop_voice_capture(&self) -> Result<()> {
        let (recorder, client) = {
            let mut handle = self.inner.handle.lock().await;
            match handle.recorder.take() {
                Some(recorder) => (recorder, handle.client.clone()),
                None => return Ok(()),
            }
        };
        self.inner.publish(SessionEvent::CaptureChanged(false));

        let clip = finish_and_release(recorder)
            .map_err(|e| SessionError::Capture(format!("recorder: {}", e)))?;
        if clip.is_empty() {
            tracing::debug!(session = %self.inner.id, "Empty voice message discarded");
            return Ok(());
        }

        let client = client.ok_or_else(|| SessionError::Capture("session is not active".to_string()))?;
        client.send_voice_message(clip).await.map_err(|e| {
            tracing::warn!(session = %self.inner.id, error = %e, "Voice message failed");
            SessionError::Capture(format!("send voice message: {}", e))
        })?;
        Ok(())
    }
}

async fn auto_save(
    gateway: Arc<PersistenceGateway>,
    config: SessionConfig,
    events: broadcast::Sender<SessionEvent>,
) {
    match gateway.save(&config, SaveKind::Auto).await {
        Ok(notice) => {
            tracing::info!(project = %config.project_name, "Project auto-saved");
            let _ = events.send(SessionEvent::Notice(notice));
        }
        Err(e) => {
            tracing::warn!(project = %config.project_name, error = %e, "Auto-save failed");
        }
    }
}

async fn pump_events(inner: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<StreamingEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if inner.terminated.load(Ordering::SeqCst) {
            continue;
        }

        match event {
            StreamingEvent::StreamReady(stream) => {
                tracing::debug!(session_id = %stream.session_id, "Media stream ready");
                inner.handle.lock().await.stream = Some(stream);
                inner.stream_ready.notify_one();
                inner.publish(SessionEvent::StreamReady);
            }
            StreamingEvent::AvatarStartTalking | StreamingEvent::AvatarStopTalking => {
                let talking = matches!(event, StreamingEvent::AvatarStartTalking);
                inner.handle.lock().await.responding = talking;
                inner.publish(SessionEvent::AvatarTalking(talking));
            }
            StreamingEvent::UserStart | StreamingEvent::UserStop => {
                let talking = matches!(event, StreamingEvent::UserStart);
                inner.handle.lock().await.user_talking = talking;
                inner.publish(SessionEvent::UserTalking(talking));
            }
            StreamingEvent::StreamDisconnected => {
                tracing::warn!(session = %inner.id, "Stream disconnected");
                let controller = SessionController { inner };
                tokio::spawn(async move {
                    controller.end(TerminationReason::RemoteDisconnect).await;
                });
            }
        }
    }
}
