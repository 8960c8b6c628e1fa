//! End-to-end conversation tests.
//!
//! A wiremock server plays the realtime service and a scripted transport
//! plays the WebRTC stack, so the whole path from toggle to persisted log
//! runs in-process:
//! - credential failure returns to OFF with a single error notice
//! - inactivity timeout ends the session and writes the final log
//! - tool calls are answered on the channel and reach the action hooks
//! - toggling off mid-negotiation cancels it before the channel opens

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use aurora::config::AssistantConfig;
use aurora::conversation::{
    ActionHooks, ConversationController, ConversationState, Input, MessageKind,
};
use aurora::realtime::{ChannelEvents, ConnectionState, PeerConnection, SessionNegotiator, Transport};
use aurora::redact::RedactedString;
use aurora::session_log::{Direction, read_session_record};
use aurora::tools::ToolResult;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ────────────────────────────────────────────────────────────────────────────
// Scripted transport
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Wire {
    sent: Mutex<Vec<serde_json::Value>>,
    events: Mutex<Option<ChannelEvents>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl Wire {
    fn sent_types(&self) -> Vec<String> {
        self.sent
            .lock()
            .map(|sent| {
                sent.iter()
                    .map(|e| e["type"].as_str().unwrap_or_default().to_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn events(&self) -> ChannelEvents {
        self.events
            .lock()
            .ok()
            .and_then(|e| e.clone())
            .unwrap_or_else(|| unreachable!("no channel opened"))
    }
}

struct ScriptedTransport(Arc<Wire>);

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, events: ChannelEvents) -> aurora::Result<Box<dyn PeerConnection>> {
        self.0.opened.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut slot) = self.0.events.lock() {
            *slot = Some(events);
        }
        Ok(Box::new(ScriptedPeer(Arc::clone(&self.0))))
    }
}

struct ScriptedPeer(Arc<Wire>);

#[async_trait]
impl PeerConnection for ScriptedPeer {
    async fn create_offer(&mut self) -> aurora::Result<String> {
        Ok("v=0\r\no=- offer\r\n".to_owned())
    }

    async fn apply_answer(&mut self, _answer_sdp: &str) -> aurora::Result<()> {
        let events = self.0.events();
        events.opened();
        events.state_changed(ConnectionState::Connected);
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> aurora::Result<()> {
        let value = serde_json::from_slice(bytes).unwrap_or(serde_json::Value::Null);
        if let Ok(mut sent) = self.0.sent.lock() {
            sent.push(value);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.0.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingHooks {
    tool_results: Mutex<Vec<(String, ToolResult)>>,
    volumes: Mutex<Vec<u8>>,
    states: Mutex<Vec<ConversationState>>,
}

impl ActionHooks for RecordingHooks {
    fn state_changed(&self, state: ConversationState) {
        if let Ok(mut s) = self.states.lock() {
            s.push(state);
        }
    }

    fn tool_result(&self, name: &str, _call_id: &str, result: &ToolResult) {
        if let Ok(mut r) = self.tool_results.lock() {
            r.push((name.to_owned(), result.clone()));
        }
    }

    fn set_volume(&self, level: u8) {
        if let Ok(mut v) = self.volumes.lock() {
            v.push(level);
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

struct Fixture {
    controller: ConversationController,
    wire: Arc<Wire>,
    hooks: Arc<RecordingHooks>,
    _server: MockServer,
    logs: tempfile::TempDir,
}

async fn fixture(credential_status: u16) -> Fixture {
    fixture_with(credential_status, None).await
}

/// Like [`fixture`], but the first credential response is held back by
/// `first_credential_delay`.
async fn fixture_with(credential_status: u16, first_credential_delay: Option<Duration>) -> Fixture {
    let server = MockServer::start().await;
    if let Some(delay) = first_credential_delay {
        Mock::given(method("POST"))
            .and(path("/v1/realtime/sessions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "id": "sess_slow",
                        "client_secret": {"value": "ek_slow"}
                    }))
                    .set_delay(delay),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
    }
    let credential = if credential_status == 200 {
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "sess_e2e",
            "client_secret": {"value": "ek_e2e", "expires_at": 1_700_000_000}
        }))
    } else {
        ResponseTemplate::new(credential_status).set_body_string("boom")
    };
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .respond_with(credential)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime"))
        .respond_with(ResponseTemplate::new(201).set_body_string("v=0\r\no=- answer\r\n"))
        .mount(&server)
        .await;

    let logs = tempfile::tempdir().unwrap_or_else(|_| unreachable!("temp dir"));
    let mut config = AssistantConfig::default();
    config.realtime.api_base_url = server.uri();
    config.logging.logs_dir = Some(logs.path().to_path_buf());
    config.logging.save_debounce_ms = 50;

    let negotiator = SessionNegotiator::with_api_key(&config.realtime, RedactedString::new("sk"))
        .unwrap_or_else(|_| unreachable!("client builds"));
    let wire = Arc::new(Wire::default());
    let hooks = Arc::new(RecordingHooks::default());
    let controller = ConversationController::new(
        config,
        Arc::new(negotiator),
        Arc::new(ScriptedTransport(Arc::clone(&wire))),
    )
    .with_hooks(Arc::clone(&hooks) as Arc<dyn ActionHooks>);

    Fixture {
        controller,
        wire,
        hooks,
        _server: server,
        logs,
    }
}

async fn step(c: &mut ConversationController) {
    let keep_going = tokio::time::timeout(Duration::from_secs(5), c.step())
        .await
        .unwrap_or_else(|_| unreachable!("controller stalled"));
    assert!(keep_going);
}

/// Toggle on and process inputs until the session configuration is sent.
async fn connect(f: &mut Fixture) {
    f.controller.handle(Input::Toggle).await;
    for _ in 0..10 {
        if f.controller.is_configured() {
            return;
        }
        step(&mut f.controller).await;
    }
    assert!(f.controller.is_configured(), "session never configured");
}

async fn deliver(f: &mut Fixture, event: serde_json::Value) {
    f.wire.events().message(event.to_string().into_bytes());
    step(&mut f.controller).await;
}

fn json_files(dir: &Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect()
        })
        .unwrap_or_default()
}

// ────────────────────────────────────────────────────────────────────────────
// Scenarios
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn credential_failure_returns_to_off_with_one_notice() {
    let mut f = fixture(500).await;
    f.controller.handle(Input::Toggle).await;
    assert_eq!(f.controller.state(), ConversationState::Active);

    step(&mut f.controller).await;
    assert_eq!(f.controller.state(), ConversationState::Off);

    let messages: Vec<_> = f.controller.transcript().messages().collect();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].kind, MessageKind::System);
    assert_eq!(messages[0].text, "Connection error occurred");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(json_files(f.logs.path()).is_empty());
}

#[tokio::test]
async fn connect_sends_configuration_with_tools() {
    let mut f = fixture(200).await;
    connect(&mut f).await;

    assert_eq!(f.wire.sent_types(), vec!["session.update", "response.create"]);
    let update = f
        .wire
        .sent
        .lock()
        .map(|s| s[0].clone())
        .unwrap_or_default();
    assert_eq!(update["session"]["tool_choice"], "auto");
    assert_eq!(update["session"]["tools"].as_array().map(Vec::len), Some(3));
    assert_eq!(update["session"]["modalities"], json!(["text", "audio"]));
    assert!(
        f.controller
            .transcript()
            .messages()
            .any(|m| m.text == "Connected to assistant")
    );
    assert_eq!(
        f.controller.logger().session_id().await.as_deref(),
        Some("sess_e2e")
    );
}

#[tokio::test]
async fn inactivity_timeout_writes_final_log() {
    let mut f = fixture(200).await;
    connect(&mut f).await;

    deliver(&mut f, json!({"type": "response.audio_transcript.delta", "delta": "Hi"})).await;
    deliver(&mut f, json!({"type": "response.done"})).await;
    deliver(&mut f, json!({"type": "rate_limits.updated", "rate_limits": []})).await;

    let start = f.controller.clock().last_user_speech_at;
    f.controller
        .handle(Input::Tick(start + Duration::from_secs(61)))
        .await;
    assert_eq!(f.controller.state(), ConversationState::Off);
    assert!(f.controller.transcript().is_empty());
    assert!(f.wire.closed.load(Ordering::SeqCst) >= 1);

    let files = json_files(f.logs.path());
    assert_eq!(files.len(), 1);
    let record = match read_session_record(&files[0]).await {
        Ok(r) => r,
        Err(e) => unreachable!("log unreadable: {e}"),
    };
    assert_eq!(record.session_id, "sess_e2e");
    // credential response, session.update, response.create, three inbound events
    assert_eq!(record.events.len(), 6);
    assert_eq!(record.events[0].direction, Direction::Received);
    assert_eq!(record.events[0].event["client_secret"]["value"], "[REDACTED]");
    assert_eq!(record.events[1].direction, Direction::Sent);
    assert_eq!(record.events[5].event["type"], "rate_limits.updated");
    assert!(record.end_time >= record.events[5].timestamp);
}

#[tokio::test]
async fn deltas_coalesce_per_response() {
    let mut f = fixture(200).await;
    connect(&mut f).await;

    for part in ["Hel", "lo, ", "world"] {
        deliver(&mut f, json!({"type": "response.audio_transcript.delta", "delta": part})).await;
    }
    deliver(&mut f, json!({"type": "response.done"})).await;
    deliver(&mut f, json!({"type": "response.audio_transcript.delta", "delta": "Again"})).await;

    let assistant: Vec<String> = f
        .controller
        .transcript()
        .messages()
        .filter(|m| m.kind == MessageKind::Assistant)
        .map(|m| m.text.clone())
        .collect();
    assert_eq!(assistant, vec!["Hello, world".to_owned(), "Again".to_owned()]);
}

#[tokio::test]
async fn volume_tool_reaches_hooks_and_asks_for_response() {
    let mut f = fixture(200).await;
    connect(&mut f).await;

    deliver(
        &mut f,
        json!({
            "type": "response.function_call_arguments.done",
            "name": "setVolume",
            "call_id": "call_vol",
            "arguments": "{\"level\": 150}"
        }),
    )
    .await;

    assert_eq!(f.controller.state(), ConversationState::Active);
    assert_eq!(f.hooks.volumes.lock().map(|v| v.clone()).unwrap_or_default(), vec![100]);
    let sent = f.wire.sent.lock().map(|s| s.clone()).unwrap_or_default();
    let output = &sent[2];
    assert_eq!(output["type"], "conversation.item.create");
    assert_eq!(output["item"]["type"], "function_call_output");
    assert_eq!(output["item"]["call_id"], "call_vol");
    let result: serde_json::Value = serde_json::from_str(output["item"]["output"].as_str().unwrap_or("{}"))
        .unwrap_or_default();
    assert_eq!(result["success"], true);
    assert_eq!(result["level"], 100);
    assert_eq!(sent[3]["type"], "response.create");
}

#[tokio::test]
async fn unknown_tool_is_answered_with_failure() {
    let mut f = fixture(200).await;
    connect(&mut f).await;

    deliver(
        &mut f,
        json!({
            "type": "response.function_call_arguments.done",
            "name": "launchRocket",
            "call_id": "call_x",
            "arguments": "{}"
        }),
    )
    .await;

    assert_eq!(f.controller.state(), ConversationState::Active);
    let results = f.hooks.tool_results.lock().map(|r| r.clone()).unwrap_or_default();
    assert_eq!(results.len(), 1);
    assert!(!results[0].1.success);
}

#[tokio::test]
async fn end_conversation_tool_turns_off() {
    let mut f = fixture(200).await;
    connect(&mut f).await;

    deliver(
        &mut f,
        json!({
            "type": "response.function_call_arguments.done",
            "name": "endConversation",
            "call_id": "call_end",
            "arguments": ""
        }),
    )
    .await;

    assert_eq!(f.controller.state(), ConversationState::Off);
    assert_eq!(
        f.wire.sent_types().last().map(String::as_str),
        Some("conversation.item.create")
    );
    let states = f.hooks.states.lock().map(|s| s.clone()).unwrap_or_default();
    assert_eq!(states, vec![ConversationState::Active, ConversationState::Off]);
    assert_eq!(json_files(f.logs.path()).len(), 1);
}

#[tokio::test]
async fn disconnect_is_fatal() {
    let mut f = fixture(200).await;
    connect(&mut f).await;

    f.wire.events().state_changed(ConnectionState::Disconnected);
    step(&mut f.controller).await;

    assert_eq!(f.controller.state(), ConversationState::Off);
    let texts: Vec<&str> = f
        .controller
        .transcript()
        .messages()
        .map(|m| m.text.as_str())
        .collect();
    assert_eq!(texts, vec!["Connection error occurred"]);
}

/// True when no input arrives within `wait`.
async fn queue_stays_empty(c: &mut ConversationController, wait: Duration) -> bool {
    tokio::time::timeout(wait, c.step()).await.is_err()
}

#[tokio::test]
async fn toggle_off_cancels_pending_negotiation() {
    let mut f = fixture_with(200, Some(Duration::from_millis(300))).await;
    f.controller.handle(Input::Toggle).await;
    f.controller.handle(Input::Toggle).await;
    assert_eq!(f.controller.state(), ConversationState::Off);

    assert!(queue_stays_empty(&mut f.controller, Duration::from_millis(600)).await);
    assert_eq!(f.wire.opened.load(Ordering::SeqCst), 0);
    assert_eq!(f.wire.closed.load(Ordering::SeqCst), 0);
    assert!(f.wire.sent_types().is_empty());
    assert!(f.controller.logger().session_id().await.is_none());
}

#[tokio::test]
async fn reactivation_is_not_disturbed_by_slow_first_attempt() {
    let mut f = fixture_with(200, Some(Duration::from_millis(300))).await;
    f.controller.handle(Input::Toggle).await;
    f.controller.handle(Input::Toggle).await;
    connect(&mut f).await;
    assert_eq!(
        f.controller.logger().session_id().await.as_deref(),
        Some("sess_e2e")
    );

    // Outlive the first attempt's delayed credential.
    assert!(queue_stays_empty(&mut f.controller, Duration::from_millis(600)).await);
    assert_eq!(f.wire.opened.load(Ordering::SeqCst), 1);
    assert_eq!(f.wire.closed.load(Ordering::SeqCst), 0);
    assert_eq!(f.wire.sent_types(), vec!["session.update", "response.create"]);

    deliver(&mut f, json!({"type": "response.audio_transcript.delta", "delta": "Still here"})).await;
    assert_eq!(f.controller.state(), ConversationState::Active);
    assert!(
        f.controller
            .transcript()
            .messages()
            .any(|m| m.kind == MessageKind::Assistant && m.text == "Still here")
    );
    assert_eq!(
        f.controller.logger().session_id().await.as_deref(),
        Some("sess_e2e")
    );
}

#[tokio::test]
async fn user_transcription_is_requested_and_shown() {
    let mut f = fixture(200).await;
    connect(&mut f).await;

    let update = f.wire.sent.lock().map(|s| s[0].clone()).unwrap_or_default();
    assert_eq!(
        update["session"]["input_audio_transcription"],
        json!({"model": "whisper-1"})
    );

    deliver(
        &mut f,
        json!({
            "type": "conversation.item.input_audio_transcription.completed",
            "item_id": "item_u1",
            "content_index": 0,
            "transcript": "Hide the weather"
        }),
    )
    .await;
    assert!(
        f.controller
            .transcript()
            .messages()
            .any(|m| m.kind == MessageKind::User && m.text == "Hide the weather")
    );
}

#[tokio::test]
async fn malformed_event_is_logged_and_survived() {
    let mut f = fixture(200).await;
    connect(&mut f).await;

    f.wire.events().message(b"{not json".to_vec());
    step(&mut f.controller).await;
    assert_eq!(f.controller.state(), ConversationState::Active);
    assert!(
        f.controller
            .transcript()
            .messages()
            .any(|m| m.text == "Error processing message")
    );

    f.controller.handle(Input::Toggle).await;
    let files = json_files(f.logs.path());
    let record = match read_session_record(&files[0]).await {
        Ok(r) => r,
        Err(e) => unreachable!("log unreadable: {e}"),
    };
    let last = record.events.last().map(|e| (e.direction, e.event.clone()));
    assert_eq!(last, Some((Direction::Error, json!("{not json"))));
}
