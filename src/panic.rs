//! Rendering of panic payloads caught from session and forwarder tasks.

use std::{any::Any, fmt};

/// Displays a caught panic payload.
///
/// String payloads print verbatim; anything else prints as `Any { .. }`.
///
/// ```
/// use std::any::Any;
///
/// use firerelay::panic::PanicMessage;
///
/// let text: Box<dyn Any + Send> = Box::new("boom");
/// assert_eq!(PanicMessage::from(text).to_string(), "boom");
/// let number: Box<dyn Any + Send> = Box::new(7_u8);
/// assert!(PanicMessage::from(number).to_string().starts_with("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl From<Box<dyn Any + Send>> for PanicMessage {
    fn from(payload: Box<dyn Any + Send>) -> Self { Self(payload) }
}

impl PanicMessage {
    fn as_text(&self) -> Option<&str> {
        self.0
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| self.0.downcast_ref::<&'static str>().copied())
    }
}

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(text),
            None => write!(f, "{:?}", self.0),
        }
    }
}
