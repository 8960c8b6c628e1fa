//! Stdin/stdout JSON bridge to a native shell.
//!
//! Reads newline-delimited [`HostCommand`]s from stdin, turns them into
//! controller inputs, and writes [`EventEnvelope`]s as newline-delimited
//! JSON to stdout. The shell's WebRTC stack is exposed to the controller as
//! a [`Transport`] whose peer forwards offers, answers and channel traffic
//! over the same protocol.
//!
//! Only the peer of the most recently opened attempt talks to the shell. A
//! peer from an older attempt emits nothing and leaves the shared slots
//! alone, so a late negotiation task cannot disturb the live channel.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AssistantConfig;
use crate::conversation::{ActionHooks, ConversationController, ConversationState, Input, Message};
use crate::error::{Result, VoiceError};
use crate::host::contract::{EventEnvelope, HostCommand, HostEvent};
use crate::realtime::{ChannelEvents, PeerConnection, SessionNegotiator, Transport};
use crate::tools::ToolResult;

/// How long the shell has to answer an `offer.request`.
const OFFER_TIMEOUT: Duration = Duration::from_secs(15);

/// Watchdog tick period.
const TICK_PERIOD: Duration = Duration::from_secs(1);

/// State shared by the transport, its peers and the command bridge.
struct BridgeShared {
    /// Channel handle of the most recently opened peer.
    events: Mutex<Option<ChannelEvents>>,
    /// Attempt that owns the shell's channel.
    latest_attempt: AtomicU64,
    pending_offer: Mutex<Option<oneshot::Sender<String>>>,
    out: mpsc::UnboundedSender<HostEvent>,
}

impl BridgeShared {
    fn emit(&self, event: HostEvent) {
        if self.out.send(event).is_err() {
            debug!("stdout writer gone; dropping host event");
        }
    }

    fn current_events(&self) -> Option<ChannelEvents> {
        self.events.lock().ok().and_then(|e| e.clone())
    }

    fn owns_channel(&self, attempt: u64) -> bool {
        self.latest_attempt.load(Ordering::SeqCst) == attempt
    }

    /// Claim the channel for `attempt`. Fails for an attempt older than the
    /// current owner.
    fn claim(&self, attempt: u64) -> bool {
        self.latest_attempt
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |latest| {
                (attempt >= latest).then_some(attempt)
            })
            .is_ok()
    }
}

/// [`Transport`] backed by the shell's WebRTC stack.
#[derive(Clone)]
pub struct StdioTransport {
    shared: Arc<BridgeShared>,
    offer_timeout: Duration,
}

#[async_trait]
impl Transport for StdioTransport {
    async fn open(&self, events: ChannelEvents) -> Result<Box<dyn PeerConnection>> {
        let attempt = events.attempt();
        if !self.shared.claim(attempt) {
            debug!(attempt, "refusing to open channel for a superseded attempt");
            return Err(VoiceError::Channel(format!(
                "attempt {attempt} superseded"
            )));
        }
        if let Ok(mut slot) = self.shared.events.lock() {
            *slot = Some(events);
        }
        Ok(Box::new(StdioPeer {
            shared: Arc::clone(&self.shared),
            attempt,
            offer_timeout: self.offer_timeout,
            closed: false,
        }))
    }
}

struct StdioPeer {
    shared: Arc<BridgeShared>,
    attempt: u64,
    offer_timeout: Duration,
    closed: bool,
}

impl StdioPeer {
    fn ensure_current(&self) -> Result<()> {
        if self.shared.owns_channel(self.attempt) {
            Ok(())
        } else {
            Err(VoiceError::Negotiation(format!(
                "attempt {} superseded",
                self.attempt
            )))
        }
    }
}

#[async_trait]
impl PeerConnection for StdioPeer {
    async fn create_offer(&mut self) -> Result<String> {
        self.ensure_current()?;
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.shared.pending_offer.lock() {
            *pending = Some(tx);
        }
        self.shared.emit(HostEvent::OfferRequest);
        match tokio::time::timeout(self.offer_timeout, rx).await {
            Ok(Ok(sdp)) => Ok(sdp),
            Ok(Err(_)) => Err(VoiceError::Negotiation(
                "offer request superseded".to_owned(),
            )),
            Err(_) => Err(VoiceError::Negotiation(format!(
                "no offer from host within {}s",
                self.offer_timeout.as_secs()
            ))),
        }
    }

    async fn apply_answer(&mut self, answer_sdp: &str) -> Result<()> {
        self.ensure_current()?;
        self.shared.emit(HostEvent::Answer {
            sdp: answer_sdp.to_owned(),
        });
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        if self.closed {
            return Err(VoiceError::Channel("channel closed".to_owned()));
        }
        if !self.shared.owns_channel(self.attempt) {
            return Err(VoiceError::Channel(format!(
                "attempt {} superseded",
                self.attempt
            )));
        }
        let data = String::from_utf8(bytes.to_vec())
            .map_err(|e| VoiceError::Channel(format!("outbound event is not UTF-8: {e}")))?;
        self.shared.emit(HostEvent::ChannelSend { data });
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if !self.shared.owns_channel(self.attempt) {
            debug!(attempt = self.attempt, "closing superseded peer without touching the channel");
            return;
        }
        if let Ok(mut slot) = self.shared.events.lock() {
            if slot.as_ref().is_some_and(|e| e.attempt() == self.attempt) {
                *slot = None;
            }
        }
        if let Ok(mut pending) = self.shared.pending_offer.lock() {
            pending.take();
        }
        self.shared.emit(HostEvent::ChannelClose);
    }
}

/// [`ActionHooks`] that forward every effect to the shell.
#[derive(Clone)]
pub struct StdioHooks {
    out: mpsc::UnboundedSender<HostEvent>,
}

impl StdioHooks {
    fn emit(&self, event: HostEvent) {
        let _ = self.out.send(event);
    }
}

impl ActionHooks for StdioHooks {
    fn state_changed(&self, state: ConversationState) {
        self.emit(HostEvent::State { state });
    }

    fn transcript_updated(&self, messages: &[Message]) {
        self.emit(HostEvent::Transcript {
            messages: messages.to_vec(),
        });
    }

    fn tool_result(&self, name: &str, call_id: &str, result: &ToolResult) {
        self.emit(HostEvent::ToolResult {
            name: name.to_owned(),
            call_id: call_id.to_owned(),
            result: result.clone(),
        });
    }

    fn set_volume(&self, level: u8) {
        self.emit(HostEvent::Volume { level });
    }

    fn set_module_visibility(&self, module: &str, visible: bool) {
        self.emit(HostEvent::ModuleVisibility {
            module: module.to_owned(),
            visible,
        });
    }
}

/// Routes shell commands to the controller and the active peer.
pub struct HostBridge {
    shared: Arc<BridgeShared>,
    inputs: mpsc::UnboundedSender<Input>,
    toggle_key: String,
}

impl HostBridge {
    /// Create a bridge plus the transport and hooks that share its state.
    ///
    /// Host events are delivered to `out`; controller inputs go to `inputs`.
    pub fn new(
        toggle_key: impl Into<String>,
        inputs: mpsc::UnboundedSender<Input>,
        out: mpsc::UnboundedSender<HostEvent>,
    ) -> (Self, StdioTransport, StdioHooks) {
        let shared = Arc::new(BridgeShared {
            events: Mutex::new(None),
            latest_attempt: AtomicU64::new(0),
            pending_offer: Mutex::new(None),
            out: out.clone(),
        });
        let transport = StdioTransport {
            shared: Arc::clone(&shared),
            offer_timeout: OFFER_TIMEOUT,
        };
        let bridge = Self {
            shared,
            inputs,
            toggle_key: toggle_key.into(),
        };
        (bridge, transport, StdioHooks { out })
    }

    /// Late-bind the controller's input queue.
    pub fn set_inputs(&mut self, inputs: mpsc::UnboundedSender<Input>) {
        self.inputs = inputs;
    }

    /// Handle one command. Returns false when the bridge should stop.
    pub fn handle_command(&self, command: HostCommand) -> bool {
        match command {
            HostCommand::Key { key } => {
                if key == self.toggle_key {
                    self.input(Input::Toggle);
                } else {
                    debug!(key = %key, "ignoring key");
                }
            }
            HostCommand::Toggle => self.input(Input::Toggle),
            HostCommand::Offer { sdp } => {
                let pending = self.shared.pending_offer.lock().ok().and_then(|mut p| p.take());
                match pending {
                    Some(tx) => {
                        let _ = tx.send(sdp);
                    }
                    None => warn!("offer received with no pending offer request"),
                }
            }
            HostCommand::ChannelOpen => {
                self.with_events(|events| events.opened());
            }
            HostCommand::ChannelMessage { data } => {
                self.with_events(|events| events.message(data.into_bytes()));
            }
            HostCommand::ConnectionState { state } => {
                self.with_events(|events| events.state_changed(state));
            }
            HostCommand::Shutdown => {
                self.input(Input::Shutdown);
                return false;
            }
        }
        true
    }

    fn input(&self, input: Input) {
        if self.inputs.send(input).is_err() {
            warn!("controller stopped; dropping input");
        }
    }

    fn with_events(&self, f: impl FnOnce(&ChannelEvents) -> bool) {
        match self.shared.current_events() {
            Some(events) => {
                if !f(&events) {
                    warn!("controller stopped; dropping channel signal");
                }
            }
            None => debug!("no open peer; dropping channel command"),
        }
    }
}

/// Run the bridge until stdin closes or a `shutdown` command arrives.
///
/// Four tasks cooperate: the stdin reader (on this task), the stdout writer,
/// the controller loop and a one-second ticker.
///
/// # Errors
///
/// Returns an error if the API secret cannot be resolved or stdin cannot be
/// read.
pub async fn run_stdio_bridge(config: AssistantConfig) -> Result<()> {
    let negotiator = Arc::new(SessionNegotiator::new(&config.realtime)?);
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (placeholder_tx, _placeholder_rx) = mpsc::unbounded_channel();
    let toggle_key = config.controls.microphone_toggle_key.clone();

    let (mut bridge, transport, hooks) = HostBridge::new(toggle_key, placeholder_tx, out_tx);
    let controller = ConversationController::new(config, negotiator, Arc::new(transport))
        .with_hooks(Arc::new(hooks));
    let inputs = controller.input_sender();
    bridge.set_inputs(inputs.clone());

    let writer_handle = tokio::spawn(run_writer(out_rx));
    let cancel = CancellationToken::new();
    let ticker_handle = tokio::spawn(run_ticker(inputs, cancel.clone()));
    let controller_handle = tokio::spawn(controller.run(cancel.clone()));

    let reader_result = run_reader(&bridge).await;

    // EOF without a shutdown command still ends the conversation.
    bridge.handle_command(HostCommand::Shutdown);
    if let Err(e) = controller_handle.await {
        warn!(error = %e, "controller task failed");
    }
    cancel.cancel();
    let _ = ticker_handle.await;
    drop(bridge);
    if tokio::time::timeout(Duration::from_secs(1), writer_handle)
        .await
        .is_err()
    {
        debug!("stdout writer still busy at shutdown");
    }

    reader_result
}

async fn run_reader(bridge: &HostBridge) -> Result<()> {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| VoiceError::Channel(format!("failed to read from stdin: {e}")))?;
        if bytes_read == 0 {
            info!("stdin closed (EOF); shutting down bridge");
            return Ok(());
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match HostCommand::parse(trimmed) {
            Ok(command) => {
                if !bridge.handle_command(command) {
                    info!("shutdown received; stopping bridge");
                    return Ok(());
                }
            }
            Err(e) => {
                warn!(error = %e, raw_line = %trimmed, "failed to parse host command");
                bridge.shared.emit(HostEvent::Error {
                    message: format!("failed to parse command: {e}"),
                });
            }
        }
    }
}

async fn run_writer(mut rx: mpsc::UnboundedReceiver<HostEvent>) {
    let mut writer = BufWriter::new(tokio::io::stdout());
    while let Some(event) = rx.recv().await {
        let line = EventEnvelope::new(event).to_line();
        if let Err(e) = write_line(&mut writer, &line).await {
            warn!(error = %e, "failed to write to stdout; stopping writer");
            break;
        }
    }
}

async fn run_ticker(inputs: mpsc::UnboundedSender<Input>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(TICK_PERIOD);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if inputs.send(Input::Tick(Instant::now())).is_err() {
                    break;
                }
            }
        }
    }
}

/// Write a single JSON line to the buffered writer and flush.
async fn write_line(writer: &mut BufWriter<tokio::io::Stdout>, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| VoiceError::Channel(format!("failed to write to stdout: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| VoiceError::Channel(format!("failed to write newline to stdout: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| VoiceError::Channel(format!("failed to flush stdout: {e}")))
}
