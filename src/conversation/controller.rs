//! Conversation controller.
//!
//! Owns the OFF/ACTIVE state machine. Every input (toggle, tick, channel
//! activity, negotiation results) arrives on one queue and is handled to
//! completion before the next, so controller state has a single writer.
//!
//! Negotiation for each activation runs in a spawned task tagged with an
//! attempt number and its own cancellation token. Deactivating cancels the
//! token and bumps the number: the task stops at its next await point, and
//! anything it still reports is discarded. A late peer is closed.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::diagnostics;
use super::transcript::{Message, Transcript};
use super::watchdog::{ActivityClock, ActivityWatchdog, WatchdogVerdict};
use crate::config::AssistantConfig;
use crate::error::VoiceError;
use crate::realtime::{
    ChannelEvents, ChannelSignal, ClientEvent, ConnectionState, Credential, PeerConnection,
    ServerEvent, SessionNegotiator, Transport,
};
use crate::session_log::{ConversationLogger, Direction};
use crate::tools::{ToolAction, ToolRegistry, ToolResult};

pub const CONNECTING_MESSAGE: &str = "Connecting to assistant...";
pub const CONNECTED_MESSAGE: &str = "Connected to assistant";
pub const PROCESSING_ERROR_MESSAGE: &str = "Error processing message";
pub const CONNECTION_ERROR_MESSAGE: &str = "Connection error occurred";

/// Microphone state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    Off,
    Active,
}

/// Why a conversation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    UserToggle,
    InactivityTimeout,
    ConnectionFailed,
    ToolRequested,
    Shutdown,
}

impl StopReason {
    fn is_failure(self) -> bool {
        matches!(self, Self::ConnectionFailed)
    }
}

/// One unit of work for the controller.
pub enum Input {
    /// Microphone toggle (e.g. the configured key).
    Toggle,
    /// Periodic tick driving the inactivity watchdog.
    Tick(Instant),
    /// Activity on the channel opened for `attempt`.
    Channel { attempt: u64, signal: ChannelSignal },
    CredentialIssued { attempt: u64, credential: Credential },
    /// Negotiation finished; the peer is ready to carry events.
    Connected {
        attempt: u64,
        peer: Box<dyn PeerConnection>,
    },
    NegotiationFailed { attempt: u64, error: VoiceError },
    /// End any conversation and stop the run loop.
    Shutdown,
}

impl std::fmt::Debug for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Toggle => f.write_str("Toggle"),
            Self::Tick(at) => f.debug_tuple("Tick").field(at).finish(),
            Self::Channel { attempt, signal } => f
                .debug_struct("Channel")
                .field("attempt", attempt)
                .field("signal", signal)
                .finish(),
            Self::CredentialIssued { attempt, credential } => f
                .debug_struct("CredentialIssued")
                .field("attempt", attempt)
                .field("session_id", &credential.session_id)
                .finish(),
            Self::Connected { attempt, .. } => f
                .debug_struct("Connected")
                .field("attempt", attempt)
                .finish_non_exhaustive(),
            Self::NegotiationFailed { attempt, error } => f
                .debug_struct("NegotiationFailed")
                .field("attempt", attempt)
                .field("error", error)
                .finish(),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Receives effects the controller wants the surrounding host to perform.
///
/// Every method has a no-op default.
pub trait ActionHooks: Send + Sync + 'static {
    fn state_changed(&self, _state: ConversationState) {}

    /// Called with the full retained transcript after each visible change.
    fn transcript_updated(&self, _messages: &[Message]) {}

    fn tool_result(&self, _name: &str, _call_id: &str, _result: &ToolResult) {}

    /// Output volume in percent, already clamped to `0..=100`.
    fn set_volume(&self, _level: u8) {}

    fn set_module_visibility(&self, _module: &str, _visible: bool) {}
}

/// Hooks that ignore everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ActionHooks for NoopHooks {}

/// The conversation state machine.
pub struct ConversationController {
    config: AssistantConfig,
    negotiator: Arc<SessionNegotiator>,
    transport: Arc<dyn Transport>,
    tools: ToolRegistry,
    logger: Arc<ConversationLogger>,
    hooks: Arc<dyn ActionHooks>,
    watchdog: ActivityWatchdog,

    state: ConversationState,
    transcript: Transcript,
    clock: ActivityClock,
    attempt: u64,
    peer: Option<Box<dyn PeerConnection>>,
    negotiation: Option<CancellationToken>,
    channel_open: bool,
    configured: bool,
    published_revision: u64,

    tx: mpsc::UnboundedSender<Input>,
    rx: mpsc::UnboundedReceiver<Input>,
}

impl ConversationController {
    /// Create a controller with the built-in tools, a logger from the
    /// `[logging]` section and no-op hooks.
    pub fn new(
        config: AssistantConfig,
        negotiator: Arc<SessionNegotiator>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let watchdog = ActivityWatchdog::new(config.conversation.inactivity_timeout())
            .with_activity_logging(config.diagnostics.log_activity_updates);
        let logger = Arc::new(ConversationLogger::from_config(&config.logging));
        let transcript = Transcript::new(config.conversation.max_messages);
        Self {
            negotiator,
            transport,
            tools: ToolRegistry::with_builtins(),
            logger,
            hooks: Arc::new(NoopHooks),
            watchdog,
            state: ConversationState::Off,
            transcript,
            clock: ActivityClock::new(Instant::now()),
            attempt: 0,
            peer: None,
            negotiation: None,
            channel_open: false,
            configured: false,
            published_revision: 0,
            config,
            tx,
            rx,
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn ActionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Arc<ConversationLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Sender for feeding inputs from other tasks.
    pub fn input_sender(&self) -> mpsc::UnboundedSender<Input> {
        self.tx.clone()
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn clock(&self) -> &ActivityClock {
        &self.clock
    }

    pub fn logger(&self) -> &Arc<ConversationLogger> {
        &self.logger
    }

    /// Current connection attempt number.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Whether the session configuration has been sent on the current channel.
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Process the next queued input. Returns false after a shutdown input.
    pub async fn step(&mut self) -> bool {
        match self.rx.recv().await {
            Some(input) => self.handle(input).await,
            None => false,
        }
    }

    /// Process inputs until cancelled or shut down, then end any conversation.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("conversation controller started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                keep_going = self.step() => {
                    if !keep_going {
                        break;
                    }
                }
            }
        }
        self.deactivate(StopReason::Shutdown, None).await;
        info!("conversation controller stopped");
    }

    /// Handle one input. Returns false after a shutdown input.
    pub async fn handle(&mut self, input: Input) -> bool {
        match input {
            Input::Toggle => match self.state {
                ConversationState::Off => self.activate(),
                ConversationState::Active => {
                    self.deactivate(StopReason::UserToggle, None).await;
                }
            },
            Input::Tick(now) => self.on_tick(now).await,
            Input::Channel { attempt, signal } => {
                if self.is_current(attempt) {
                    self.on_channel(signal).await;
                } else {
                    debug!(attempt, current = self.attempt, "dropping stale channel signal");
                }
            }
            Input::CredentialIssued {
                attempt,
                credential,
            } => {
                if self.is_current(attempt) {
                    self.on_credential(credential).await;
                }
            }
            Input::Connected { attempt, mut peer } => {
                if self.is_current(attempt) {
                    info!(attempt, "peer connection negotiated");
                    self.negotiation = None;
                    self.peer = Some(peer);
                    self.configure_if_ready().await;
                } else {
                    debug!(attempt, "closing peer from a torn-down attempt");
                    peer.close();
                }
            }
            Input::NegotiationFailed { attempt, error } => {
                if self.is_current(attempt) {
                    warn!(code = error.code(), error = %error, "negotiation failed");
                    self.deactivate(StopReason::ConnectionFailed, Some(&error))
                        .await;
                }
            }
            Input::Shutdown => {
                self.deactivate(StopReason::Shutdown, None).await;
                return false;
            }
        }
        self.publish_transcript();
        true
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.state == ConversationState::Active && attempt == self.attempt
    }

    fn activate(&mut self) {
        self.state = ConversationState::Active;
        self.clock.reset(Instant::now());
        self.transcript.clear();
        self.transcript.push_system(CONNECTING_MESSAGE);
        self.attempt += 1;
        info!(attempt = self.attempt, "conversation activated");

        let cancel = CancellationToken::new();
        self.negotiation = Some(cancel.clone());
        tokio::spawn(negotiate(
            self.attempt,
            cancel,
            Arc::clone(&self.negotiator),
            Arc::clone(&self.transport),
            self.tx.clone(),
        ));
        self.hooks.state_changed(self.state);
    }

    async fn deactivate(&mut self, reason: StopReason, error: Option<&VoiceError>) {
        if self.state == ConversationState::Off {
            return;
        }
        self.attempt += 1;
        if let Some(cancel) = self.negotiation.take() {
            cancel.cancel();
        }
        if let Some(mut peer) = self.peer.take() {
            peer.close();
        }
        self.channel_open = false;
        self.configured = false;

        if let Some(error) = error {
            self.logger
                .record(
                    serde_json::json!({
                        "type": "error",
                        "code": error.code(),
                        "message": error.message(),
                    }),
                    Direction::Error,
                )
                .await;
        }
        self.logger.end_session().await;

        self.transcript.clear();
        if reason.is_failure() {
            self.transcript.push_system(CONNECTION_ERROR_MESSAGE);
        }
        self.state = ConversationState::Off;
        info!(reason = ?reason, "conversation deactivated");
        self.hooks.state_changed(self.state);
        self.publish_transcript();
    }

    async fn on_tick(&mut self, now: Instant) {
        if self.state != ConversationState::Active {
            return;
        }
        if self.watchdog.evaluate(&self.clock, now) == WatchdogVerdict::TimedOut {
            info!(
                timeout_secs = self.watchdog.timeout().as_secs(),
                "inactivity timeout"
            );
            self.deactivate(StopReason::InactivityTimeout, None).await;
        }
    }

    async fn on_credential(&mut self, credential: Credential) {
        self.logger
            .record(credential.response.clone(), Direction::Received)
            .await;
        if let Some(id) = credential.session_id.as_deref() {
            self.logger.start_session(id).await;
        }
    }

    async fn on_channel(&mut self, signal: ChannelSignal) {
        match signal {
            ChannelSignal::Opened => {
                if self.config.diagnostics.debug {
                    info!("data channel opened");
                }
                self.channel_open = true;
                self.configure_if_ready().await;
            }
            ChannelSignal::StateChanged(state) => {
                debug!(state = state.as_str(), "connection state changed");
                if state == ConnectionState::Connected {
                    self.transcript.push_system(CONNECTED_MESSAGE);
                } else if state.is_fatal() {
                    let error =
                        VoiceError::Channel(format!("peer connection {}", state.as_str()));
                    warn!(error = %error, "connection lost");
                    self.deactivate(StopReason::ConnectionFailed, Some(&error))
                        .await;
                }
            }
            ChannelSignal::Message(bytes) => self.on_message(&bytes).await,
        }
    }

    /// Send the session configuration once per channel.
    async fn configure_if_ready(&mut self) {
        if self.configured || !self.channel_open || self.peer.is_none() {
            return;
        }
        self.configured = true;
        let conversation = &self.config.conversation;
        let update = ClientEvent::session_update(
            conversation.instructions.clone(),
            conversation.modalities.clone(),
            self.tools.definitions().to_vec(),
        )
        .with_input_transcription(conversation.input_transcription());
        let greet = conversation.greet_on_connect;
        let modalities = conversation.modalities.clone();
        if self.config.diagnostics.debug {
            info!(tools = self.tools.definitions().len(), "sending session configuration");
        }
        self.send(update).await;
        if greet {
            self.send(ClientEvent::response_create(modalities)).await;
        }
    }

    async fn on_message(&mut self, bytes: &[u8]) {
        let (raw, event) = match ServerEvent::parse(bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "failed to process channel message");
                self.logger
                    .record(
                        serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()),
                        Direction::Error,
                    )
                    .await;
                self.transcript.push_system(PROCESSING_ERROR_MESSAGE);
                return;
            }
        };

        let diag = &self.config.diagnostics;
        diagnostics::log_inbound(diag.api_log, diag.log_activity_updates, &raw, &event);
        self.logger.record(raw, Direction::Received).await;

        match event {
            ServerEvent::TranscriptDelta { delta } => {
                self.clock.assistant_started_speaking();
                self.transcript.push_assistant_delta(&delta);
            }
            ServerEvent::ResponseDone { .. } => {
                self.transcript.complete_assistant_message();
                self.clock.assistant_finished(Instant::now());
                if self.config.diagnostics.log_activity_updates {
                    info!("assistant finished speaking");
                }
            }
            ServerEvent::ItemCreated { item } if item.is_user() => {
                self.clock.user_spoke(Instant::now());
                if self.config.diagnostics.log_activity_updates {
                    info!("user activity recorded");
                }
            }
            ServerEvent::InputTranscriptionCompleted { transcript } => {
                self.transcript.push_user(transcript.trim());
            }
            ServerEvent::FunctionCallArgumentsDone {
                name,
                call_id,
                arguments,
            } => self.on_tool_call(&name, &call_id, &arguments).await,
            ServerEvent::SessionCreated { session } => {
                if let Some(id) = session.and_then(|s| s.id) {
                    self.logger.start_session(&id).await;
                }
            }
            ServerEvent::Error { error } => {
                let detail = error.unwrap_or_default();
                warn!(
                    code = detail.code.as_deref().unwrap_or("unknown"),
                    message = detail.message.as_deref().unwrap_or(""),
                    "assistant reported an error"
                );
            }
            _ => {}
        }
    }

    async fn on_tool_call(&mut self, name: &str, call_id: &str, arguments: &str) {
        let result = self.tools.execute(name, arguments);
        self.send(ClientEvent::function_output(call_id, result.to_output()))
            .await;
        self.hooks.tool_result(name, call_id, &result);

        match &result.action {
            Some(ToolAction::EndConversation) => {
                self.deactivate(StopReason::ToolRequested, None).await;
                return;
            }
            Some(ToolAction::SetVolume { level }) => self.hooks.set_volume(*level),
            Some(ToolAction::SetModuleVisibility { module, visible }) => {
                self.hooks.set_module_visibility(module, *visible);
            }
            None => {}
        }
        let modalities = self.config.conversation.modalities.clone();
        self.send(ClientEvent::response_create(modalities)).await;
    }

    /// Send an event on the channel and record it.
    async fn send(&mut self, event: ClientEvent) {
        let value = event.to_value();
        let Some(peer) = self.peer.as_mut() else {
            warn!("no open channel; dropping outbound event");
            return;
        };
        if let Err(e) = peer.send(value.to_string().as_bytes()) {
            warn!(error = %e, "failed to send channel message");
        }
        self.logger.record(value, Direction::Sent).await;
    }

    fn publish_transcript(&mut self) {
        let revision = self.transcript.revision();
        if revision != self.published_revision {
            self.published_revision = revision;
            self.hooks.transcript_updated(&self.transcript.to_vec());
        }
    }
}

/// Credential, offer and answer for one activation, reported back as inputs.
///
/// Reports nothing once `cancel` fires.
async fn negotiate(
    attempt: u64,
    cancel: CancellationToken,
    negotiator: Arc<SessionNegotiator>,
    transport: Arc<dyn Transport>,
    tx: mpsc::UnboundedSender<Input>,
) {
    let outcome = connect(attempt, &cancel, &negotiator, transport.as_ref(), &tx).await;
    let input = match outcome {
        Ok(Some(peer)) => Input::Connected { attempt, peer },
        Ok(None) => {
            debug!(attempt, "negotiation cancelled");
            return;
        }
        Err(error) if cancel.is_cancelled() => {
            debug!(attempt, error = %error, "negotiation failed after cancellation");
            return;
        }
        Err(error) => Input::NegotiationFailed { attempt, error },
    };
    if tx.send(input).is_err() {
        debug!(attempt, "controller gone before negotiation finished");
    }
}

/// `Ok(None)` when cancelled. The transport is never opened after
/// cancellation, and a peer opened before it is closed.
async fn connect(
    attempt: u64,
    cancel: &CancellationToken,
    negotiator: &SessionNegotiator,
    transport: &dyn Transport,
    tx: &mpsc::UnboundedSender<Input>,
) -> crate::error::Result<Option<Box<dyn PeerConnection>>> {
    let credential = tokio::select! {
        () = cancel.cancelled() => return Ok(None),
        issued = negotiator.request_credential() => issued?,
    };
    if cancel.is_cancelled() {
        return Ok(None);
    }
    let _ = tx.send(Input::CredentialIssued {
        attempt,
        credential: credential.clone(),
    });

    let mut peer = transport
        .open(ChannelEvents::new(attempt, tx.clone()))
        .await?;
    let exchanged = tokio::select! {
        () = cancel.cancelled() => None,
        result = exchange_sdp(peer.as_mut(), negotiator, &credential) => Some(result),
    };
    match exchanged {
        Some(Ok(())) if !cancel.is_cancelled() => Ok(Some(peer)),
        Some(Ok(())) | None => {
            peer.close();
            Ok(None)
        }
        Some(Err(e)) => {
            peer.close();
            Err(e)
        }
    }
}

async fn exchange_sdp(
    peer: &mut dyn PeerConnection,
    negotiator: &SessionNegotiator,
    credential: &Credential,
) -> crate::error::Result<()> {
    let offer = peer.create_offer().await?;
    let answer = negotiator.negotiate_channel(credential, &offer).await?;
    peer.apply_answer(&answer).await
}
