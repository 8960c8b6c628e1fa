//! Realtime negotiation contract tests.
//!
//! These tests verify the exact HTTP format of the two session endpoints:
//! - credential issuance request body, auth header and response parsing
//! - offer relay content type, query string and answer passthrough
//! - error statuses mapped to the right `VoiceError` variant

use aurora::config::RealtimeConfig;
use aurora::error::VoiceError;
use aurora::realtime::SessionNegotiator;
use aurora::redact::RedactedString;
use serde_json::json;
use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";

fn negotiator(server: &MockServer) -> SessionNegotiator {
    let config = RealtimeConfig {
        api_base_url: server.uri(),
        ..RealtimeConfig::default()
    };
    SessionNegotiator::with_api_key(&config, RedactedString::new("sk-static"))
        .unwrap_or_else(|_| unreachable!("client builds"))
}

fn session_body() -> serde_json::Value {
    json!({
        "id": "sess_abc",
        "object": "realtime.session",
        "model": MODEL,
        "client_secret": {"value": "ek_secret", "expires_at": 1_700_000_000}
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Credential issuance
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn credential_request_sends_model_voice_and_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .and(header("authorization", "Bearer sk-static"))
        .and(body_json(json!({"model": MODEL, "voice": "verse"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
        .expect(1)
        .mount(&server)
        .await;

    let credential = match negotiator(&server).request_credential().await {
        Ok(c) => c,
        Err(e) => unreachable!("credential request failed: {e}"),
    };
    assert_eq!(credential.token.as_str(), "ek_secret");
    assert_eq!(credential.session_id.as_deref(), Some("sess_abc"));
    assert_eq!(credential.expires_at, Some(1_700_000_000));
}

#[tokio::test]
async fn logged_credential_response_is_redacted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
        .mount(&server)
        .await;

    let credential = match negotiator(&server).request_credential().await {
        Ok(c) => c,
        Err(e) => unreachable!("credential request failed: {e}"),
    };
    assert_eq!(credential.response["client_secret"]["value"], "[REDACTED]");
    assert_eq!(credential.response["id"], "sess_abc");
    assert!(!credential.response.to_string().contains("ek_secret"));
}

#[tokio::test]
async fn credential_http_500_is_credential_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    match negotiator(&server).request_credential().await {
        Err(VoiceError::Credential(msg)) => {
            assert!(msg.contains("500"));
            assert!(msg.contains("upstream down"));
        }
        other => unreachable!("expected credential error, got {other:?}"),
    }
}

#[tokio::test]
async fn credential_without_secret_is_credential_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "sess_x"})))
        .mount(&server)
        .await;

    let err = match negotiator(&server).request_credential().await {
        Err(e) => e,
        Ok(_) => unreachable!("body lacks client_secret"),
    };
    assert_eq!(err.code(), "CREDENTIAL_FAILED");
}

#[tokio::test]
async fn credential_session_id_is_optional() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"client_secret": {"value": "ek"}})),
        )
        .mount(&server)
        .await;

    let credential = match negotiator(&server).request_credential().await {
        Ok(c) => c,
        Err(e) => unreachable!("credential request failed: {e}"),
    };
    assert!(credential.session_id.is_none());
    assert!(credential.expires_at.is_none());
}

// ────────────────────────────────────────────────────────────────────────────
// Offer / answer
// ────────────────────────────────────────────────────────────────────────────

async fn issued_credential(server: &MockServer) -> aurora::realtime::Credential {
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
        .mount(server)
        .await;
    match negotiator(server).request_credential().await {
        Ok(c) => c,
        Err(e) => unreachable!("credential request failed: {e}"),
    }
}

#[tokio::test]
async fn offer_is_relayed_as_sdp_with_issued_token() {
    let server = MockServer::start().await;
    let credential = issued_credential(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime"))
        .and(query_param("model", MODEL))
        .and(header("authorization", "Bearer ek_secret"))
        .and(header("content-type", "application/sdp"))
        .and(body_string("v=0\r\no=- offer\r\n"))
        .respond_with(ResponseTemplate::new(201).set_body_string("v=0\r\no=- answer\r\n"))
        .expect(1)
        .mount(&server)
        .await;

    let answer = negotiator(&server)
        .negotiate_channel(&credential, "v=0\r\no=- offer\r\n")
        .await;
    assert_eq!(answer.ok().as_deref(), Some("v=0\r\no=- answer\r\n"));
}

#[tokio::test]
async fn negotiation_http_error_reports_status() {
    let server = MockServer::start().await;
    let credential = issued_credential(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    match negotiator(&server).negotiate_channel(&credential, "v=0").await {
        Err(VoiceError::Negotiation(msg)) => assert!(msg.starts_with("HTTP error! status: 400")),
        other => unreachable!("expected negotiation error, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_answer_is_negotiation_error() {
    let server = MockServer::start().await;
    let credential = issued_credential(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;

    let err = match negotiator(&server).negotiate_channel(&credential, "v=0").await {
        Err(e) => e,
        Ok(_) => unreachable!("empty answer"),
    };
    assert_eq!(err.code(), "NEGOTIATION_FAILED");
    assert!(err.is_fatal());
}
