//! Notifications raised to collaborating layers.
//!
//! Events are delivered over an unbounded channel handed out by
//! [`Session::new`](crate::session::Session::new). Dropping the receiver
//! is allowed; the engine never blocks on event delivery.

/// Out-of-band notifications from one session.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineEvent {
    /// Transport is established and the login sequence has been submitted.
    Connected,
    /// A frame arrived on the wire (pre-dispatch, terminator stripped).
    RawReceived(String),
    /// A line finished transmitting.
    RawSent(String),
    /// A frame arrived whose command token has no registered handler.
    Unhandled(String),
    /// A read or write failed at the transport layer. The loop that
    /// observed the failure has stopped; reconnecting is the caller's
    /// decision.
    NetworkError {
        /// Platform error code, when the OS reported one.
        code: Option<i32>,
        message: String,
    },
    /// The transport has been torn down (by `disconnect` or by the peer).
    Disconnected,
}
