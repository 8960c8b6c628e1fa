//! Realtime assistant protocol: wire events, channel abstraction, negotiation.

pub mod channel;
pub mod events;
pub mod negotiator;

pub use channel::{ChannelEvents, ChannelSignal, ConnectionState, PeerConnection, Transport};
pub use events::{ClientEvent, ServerEvent};
pub use negotiator::{Credential, SessionNegotiator};
