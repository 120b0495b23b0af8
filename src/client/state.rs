use std::fmt;

/// Position of a [`Forwarder`](super::Forwarder) in its connection
/// lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; either not started or waiting out a back-off.
    #[default]
    Disconnected,
    /// Dialling the relay server.
    Connecting,
    /// Connected and waiting for the next detection.
    Ready,
    /// An exchange is in flight.
    Sending,
    /// The forwarder has stopped and will not reconnect.
    Terminated,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Sending => "sending",
            Self::Terminated => "terminated",
        })
    }
}
