//! Frame dispatch: routing decoded lines to per-command handlers.
//!
//! The engine does not parse command payloads; it extracts the command
//! token (skipping any tags and prefix), uppercases it, and looks it up in
//! the [`DispatchRegistry`]. Handlers are external collaborators that may
//! mutate the channel collection and submit new outbound lines through the
//! [`Context`] they are given. A frame with no registered handler is
//! accepted and ignored, surfacing only as an
//! [`EngineEvent::Unhandled`](crate::event::EngineEvent) notification.
//!
//! The default table installs a PING handler that learns the server's
//! self-reported name (used by the keepalive timer) and replies with PONG.

use std::collections::HashMap;

use tracing::warn;

use crate::channel::ChannelCollection;
use crate::error::Result;
use crate::queue::OutboundHandle;
use crate::session::SharedServerName;

/// One decoded protocol line with its command token located.
///
/// Only the command token is interpreted here; parameter parsing belongs
/// to the handler layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    raw: String,
    command: String,
    params: String,
}

impl Frame {
    /// Decompose a raw line into command token and parameter remainder.
    ///
    /// Leading `@tag` and `:prefix` tokens are skipped; the command token
    /// is uppercased for case-insensitive dispatch.
    pub fn parse(raw: String) -> Self {
        let mut rest = raw.as_str();
        if rest.starts_with('@') {
            rest = rest.split_once(' ').map_or("", |(_, r)| r);
            rest = rest.trim_start_matches(' ');
        }
        if rest.starts_with(':') {
            rest = rest.split_once(' ').map_or("", |(_, r)| r);
            rest = rest.trim_start_matches(' ');
        }

        let (command, params) = match rest.split_once(' ') {
            Some((c, p)) => (c, p.trim_start_matches(' ')),
            None => (rest, ""),
        };

        Self {
            command: command.to_ascii_uppercase(),
            params: params.to_string(),
            raw,
        }
    }

    /// The full line as received, terminator stripped.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Uppercased command token. Empty for an empty frame.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Everything after the command token, unparsed.
    pub fn params(&self) -> &str {
        &self.params
    }

    /// The trailing parameter (after `:`), if present.
    pub fn trailing(&self) -> Option<&str> {
        if let Some(stripped) = self.params.strip_prefix(':') {
            return Some(stripped);
        }
        self.params.find(" :").map(|i| &self.params[i + 2..])
    }
}

/// State handed to a handler for the duration of one dispatch.
pub struct Context<'a> {
    /// The session's channel collection, mutable for the handler.
    pub channels: &'a mut ChannelCollection,
    outbound: &'a OutboundHandle,
    server_name: &'a SharedServerName,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        channels: &'a mut ChannelCollection,
        outbound: &'a OutboundHandle,
        server_name: &'a SharedServerName,
    ) -> Self {
        Self {
            channels,
            outbound,
            server_name,
        }
    }

    /// Submit a formatted line through the session's outbound queue.
    pub fn send_line(&self, line: impl Into<String>) -> Result<()> {
        self.outbound.send_line(line)
    }

    /// The server's self-reported name, once learned.
    pub fn server_name(&self) -> Option<String> {
        self.server_name
            .lock()
            .expect("server name mutex poisoned")
            .clone()
    }

    /// Record the server's self-reported name for the keepalive timer.
    pub fn set_server_name(&self, name: impl Into<String>) {
        *self
            .server_name
            .lock()
            .expect("server name mutex poisoned") = Some(name.into());
    }
}

/// A per-command handler callback.
pub type Handler = Box<dyn FnMut(&mut Context<'_>, &Frame) + Send>;

/// An observer invoked for every frame before dispatch.
pub type RawObserver = Box<dyn FnMut(&Frame) + Send>;

/// Mutable mapping from uppercased command token to handler.
#[derive(Default)]
pub struct DispatchRegistry {
    handlers: HashMap<String, Handler>,
    observers: Vec<RawObserver>,
}

impl DispatchRegistry {
    /// Empty registry with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry initialized from the default handler table.
    ///
    /// Currently: PING (learns the server name, replies PONG).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.set_handler(
            "PING",
            Box::new(|ctx, frame| {
                let payload = frame.trailing().unwrap_or(frame.params()).to_string();
                if !payload.is_empty() {
                    ctx.set_server_name(&payload);
                }
                let _ = ctx.send_line(format!("PONG :{payload}"));
            }),
        );
        registry
    }

    /// Register (or replace) the handler for a command token.
    ///
    /// The token is uppercased, so registration and lookup are
    /// case-insensitive. Returns the previous handler when overwriting,
    /// so callers can detect shadowing.
    pub fn set_handler(&mut self, token: &str, handler: Handler) -> Option<Handler> {
        let key = token.to_ascii_uppercase();
        let previous = self.handlers.insert(key.clone(), handler);
        if previous.is_some() {
            warn!(command = %key, "overwriting existing handler");
        }
        previous
    }

    /// Whether a handler is registered for the token.
    pub fn has_handler(&self, token: &str) -> bool {
        self.handlers.contains_key(&token.to_ascii_uppercase())
    }

    /// Add an observer notified for every frame, handled or not.
    pub fn add_raw_observer(&mut self, observer: RawObserver) {
        self.observers.push(observer);
    }

    /// Notify observers, then route the frame to its handler.
    ///
    /// Returns `true` when a handler ran.
    pub fn dispatch(&mut self, ctx: &mut Context<'_>, frame: &Frame) -> bool {
        for observer in &mut self.observers {
            observer(frame);
        }
        match self.handlers.get_mut(frame.command()) {
            Some(handler) => {
                handler(ctx, frame);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::channel::NullUserPool;

    fn make_ctx_parts() -> (ChannelCollection, OutboundHandle, SharedServerName) {
        let outbound = OutboundHandle::new();
        outbound.attach();
        let channels =
            ChannelCollection::new(outbound.clone(), Arc::new(NullUserPool), None, true);
        (channels, outbound, SharedServerName::default())
    }

    #[test]
    fn test_frame_parse_plain() {
        let frame = Frame::parse("ping :server.example".to_string());
        assert_eq!(frame.command(), "PING");
        assert_eq!(frame.params(), ":server.example");
        assert_eq!(frame.trailing(), Some("server.example"));
    }

    #[test]
    fn test_frame_parse_with_prefix_and_tags() {
        let frame = Frame::parse(
            "@time=2023-01-01T00:00:00Z :nick!user@host PRIVMSG #chan :hello there".to_string(),
        );
        assert_eq!(frame.command(), "PRIVMSG");
        assert_eq!(frame.params(), "#chan :hello there");
        assert_eq!(frame.trailing(), Some("hello there"));
    }

    #[test]
    fn test_frame_parse_empty() {
        let frame = Frame::parse(String::new());
        assert_eq!(frame.command(), "");
        assert_eq!(frame.params(), "");
    }

    #[test]
    fn test_set_handler_returns_previous() {
        let mut registry = DispatchRegistry::new();
        assert!(registry.set_handler("join", Box::new(|_, _| {})).is_none());
        // Same token, different case: the first mapping is shadowed.
        let previous = registry.set_handler("JOIN", Box::new(|_, _| {}));
        assert!(previous.is_some());
        assert!(registry.has_handler("Join"));
    }

    #[test]
    fn test_dispatch_case_insensitive() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = DispatchRegistry::new();
        let counter = hits.clone();
        registry.set_handler(
            "privmsg",
            Box::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let (mut channels, outbound, server_name) = make_ctx_parts();
        let mut ctx = Context::new(&mut channels, &outbound, &server_name);
        let frame = Frame::parse("PrivMsg #chan :hi".to_string());
        assert!(registry.dispatch(&mut ctx, &frame));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregistered_command_falls_through() {
        let mut registry = DispatchRegistry::new();
        let (mut channels, outbound, server_name) = make_ctx_parts();
        let mut ctx = Context::new(&mut channels, &outbound, &server_name);
        let frame = Frame::parse("WALLOPS :notice".to_string());
        assert!(!registry.dispatch(&mut ctx, &frame));
    }

    #[test]
    fn test_observers_run_regardless_of_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = DispatchRegistry::new();
        for _ in 0..2 {
            let log = seen.clone();
            registry.add_raw_observer(Box::new(move |frame| {
                log.lock().unwrap().push(frame.raw().to_string());
            }));
        }

        let (mut channels, outbound, server_name) = make_ctx_parts();
        let mut ctx = Context::new(&mut channels, &outbound, &server_name);
        let frame = Frame::parse("UNKNOWN x".to_string());
        registry.dispatch(&mut ctx, &frame);

        // Both observers saw the frame even though nothing handled it.
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_default_ping_handler() {
        let mut registry = DispatchRegistry::with_defaults();
        let (mut channels, outbound, server_name) = make_ctx_parts();

        {
            let mut ctx = Context::new(&mut channels, &outbound, &server_name);
            let frame = Frame::parse("PING :server.example".to_string());
            assert!(registry.dispatch(&mut ctx, &frame));
        }

        assert_eq!(
            server_name.lock().unwrap().as_deref(),
            Some("server.example")
        );
        assert_eq!(
            outbound.queue().try_begin().as_deref(),
            Some("PONG :server.example")
        );
    }
}
