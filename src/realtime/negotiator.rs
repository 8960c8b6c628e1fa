//! Credential issuance and offer/answer negotiation with the realtime service.
//!
//! Two HTTP calls establish a session:
//!
//! 1. `POST {base}/v1/realtime/sessions` with the static API secret returns a
//!    short-lived client secret (and usually the session id).
//! 2. `POST {base}/v1/realtime?model=…` with the local offer SDP, authorized
//!    by the client secret, returns the answer SDP.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::RealtimeConfig;
use crate::error::{Result, VoiceError};
use crate::redact::{RedactedString, redact_client_secret};

/// Short-lived credential issued for one session.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Client secret used to authorize the negotiation call.
    pub token: RedactedString,
    /// Session id assigned by the service, when present.
    pub session_id: Option<String>,
    /// Expiry of the client secret (unix seconds), when present.
    pub expires_at: Option<i64>,
    /// Full response body with the secret redacted, for the conversation log.
    pub response: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(default)]
    id: Option<String>,
    client_secret: ClientSecret,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

/// HTTP client for the session-issuance and negotiation endpoints.
#[derive(Debug, Clone)]
pub struct SessionNegotiator {
    client: reqwest::Client,
    base_url: String,
    api_key: RedactedString,
    model: String,
    voice: String,
}

impl SessionNegotiator {
    /// Build a negotiator from config, resolving the API secret.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Config`] when no API secret is available or the
    /// HTTP client cannot be built.
    pub fn new(config: &RealtimeConfig) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        Self::with_api_key(config, api_key)
    }

    /// Build a negotiator with an explicit API secret.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Config`] if the HTTP client cannot be built.
    pub fn with_api_key(config: &RealtimeConfig, api_key: RedactedString) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            api_key,
            model: config.model.clone(),
            voice: config.voice.clone(),
        })
    }

    /// Obtain a short-lived client secret for a new session.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Credential`] on transport failure, non-success
    /// status, or a body without `client_secret.value`.
    pub async fn request_credential(&self) -> Result<Credential> {
        let url = format!("{}/v1/realtime/sessions", self.base_url);
        debug!(url = %url, model = %self.model, voice = %self.voice, "requesting realtime credential");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.as_str())
            .json(&serde_json::json!({
                "model": self.model,
                "voice": self.voice,
            }))
            .send()
            .await
            .map_err(|e| VoiceError::Credential(format!("session request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VoiceError::Credential(format!("failed to read session response: {e}")))?;

        if !status.is_success() {
            return Err(VoiceError::Credential(format!(
                "failed to get ephemeral token: {}, {body}",
                status.as_u16()
            )));
        }

        let mut raw: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| VoiceError::Credential(format!("session response is not JSON: {e}")))?;
        let parsed = SessionResponse::deserialize(&raw)
            .map_err(|e| VoiceError::Credential(format!("unexpected session response: {e}")))?;
        redact_client_secret(&mut raw);

        info!(session_id = ?parsed.id, "received realtime credential");
        Ok(Credential {
            token: RedactedString::new(parsed.client_secret.value),
            session_id: parsed.id,
            expires_at: parsed.client_secret.expires_at,
            response: raw,
        })
    }

    /// Relay the local offer and return the remote answer SDP.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Negotiation`] on transport failure or a
    /// non-success status.
    pub async fn negotiate_channel(&self, credential: &Credential, offer_sdp: &str) -> Result<String> {
        let url = format!("{}/v1/realtime", self.base_url);
        debug!(url = %url, offer_bytes = offer_sdp.len(), "relaying offer");

        let response = self
            .client
            .post(&url)
            .query(&[("model", self.model.as_str())])
            .bearer_auth(credential.token.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(offer_sdp.to_owned())
            .send()
            .await
            .map_err(|e| VoiceError::Negotiation(format!("offer relay failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(VoiceError::Negotiation(format!(
                "HTTP error! status: {}{}",
                status.as_u16(),
                if detail.is_empty() {
                    String::new()
                } else {
                    format!(", {detail}")
                }
            )));
        }

        let answer = response
            .text()
            .await
            .map_err(|e| VoiceError::Negotiation(format!("failed to read answer: {e}")))?;
        if answer.trim().is_empty() {
            return Err(VoiceError::Negotiation("empty answer SDP".to_owned()));
        }
        Ok(answer)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}
