//! Forwarding side of the relay.
//!
//! A [`Forwarder`] drains a [`DetectionQueue`](crate::queue::DetectionQueue)
//! over one persistent TCP connection to the relay server. It owns the
//! reconnect state machine and performs the lock-step send/ack exchange for
//! each detection, retransmitting a detection whose exchange was interrupted
//! once the connection has been re-established.

mod config;
mod connection;
mod error;
mod forwarder;
mod state;

pub use config::{
    DEFAULT_MAX_SEND_ATTEMPTS,
    DEFAULT_POLL_INTERVAL,
    ForwarderConfig,
    ReconnectPolicy,
};
pub use connection::RelayConnection;
pub use error::ForwarderError;
pub use forwarder::{Forwarder, ForwarderReport};
pub use state::ConnectionState;
