//! Secret redaction for credentials that pass through logs.

use std::fmt;

/// Placeholder written in place of secret values.
pub const REDACTED: &str = "[REDACTED]";

/// A string wrapper that redacts its value in Display and Debug output.
///
/// The only way to read the inner value is [`as_str`](Self::as_str).
#[derive(Clone, PartialEq, Eq)]
pub struct RedactedString {
    inner: String,
}

impl RedactedString {
    /// Wrap a secret value.
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// Access the inner value (for HTTP headers only).
    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl fmt::Display for RedactedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Debug for RedactedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RedactedString(\"{REDACTED}\")")
    }
}

/// Replace `client_secret.value` in a session-issuance response body.
///
/// The rest of the body (session id, model, expiry) is left intact so the
/// logged event stays useful.
pub fn redact_client_secret(body: &mut serde_json::Value) {
    if let Some(value) = body
        .get_mut("client_secret")
        .and_then(|secret| secret.get_mut("value"))
    {
        *value = serde_json::Value::String(REDACTED.to_owned());
    }
}
