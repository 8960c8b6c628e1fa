//! Abstract peer connection and data channel.
//!
//! The concrete media transport (WebRTC in a browser or native shell) lives
//! outside this crate. The controller only sees the [`Transport`] and
//! [`PeerConnection`] traits, and receives channel activity through a
//! [`ChannelEvents`] handle that the transport calls into.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::conversation::Input;
use crate::error::Result;

/// Peer connection state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Failed and disconnected connections end the session.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Failed | Self::Disconnected)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

/// Activity reported by a live channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    /// The data channel is open and can carry events.
    Opened,
    /// One inbound message.
    Message(Vec<u8>),
    /// The peer connection changed state.
    StateChanged(ConnectionState),
}

/// Handle the transport uses to deliver channel activity to the controller.
///
/// Each handle is bound to one connection attempt; signals from an attempt
/// that has since been torn down are discarded by the controller.
#[derive(Debug, Clone)]
pub struct ChannelEvents {
    attempt: u64,
    tx: mpsc::UnboundedSender<Input>,
}

impl ChannelEvents {
    pub(crate) fn new(attempt: u64, tx: mpsc::UnboundedSender<Input>) -> Self {
        Self { attempt, tx }
    }

    /// Connection attempt this handle belongs to.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn opened(&self) -> bool {
        self.emit(ChannelSignal::Opened)
    }

    pub fn message(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.emit(ChannelSignal::Message(bytes.into()))
    }

    pub fn state_changed(&self, state: ConnectionState) -> bool {
        self.emit(ChannelSignal::StateChanged(state))
    }

    /// Returns false once the controller has gone away.
    fn emit(&self, signal: ChannelSignal) -> bool {
        self.tx
            .send(Input::Channel {
                attempt: self.attempt,
                signal,
            })
            .is_ok()
    }
}

/// Factory for peer connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Create a peer connection (with local audio attached and a data
    /// channel created) whose activity is delivered to `events`.
    async fn open(&self, events: ChannelEvents) -> Result<Box<dyn PeerConnection>>;
}

/// One peer connection with its structured-event data channel.
#[async_trait]
pub trait PeerConnection: Send + 'static {
    /// Create the local offer and return its SDP.
    async fn create_offer(&mut self) -> Result<String>;

    /// Apply the remote answer SDP.
    async fn apply_answer(&mut self, answer_sdp: &str) -> Result<()>;

    /// Send one message on the data channel.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Close the data channel and the connection. Must be idempotent.
    fn close(&mut self);
}
