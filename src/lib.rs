//! # slirc-client
//!
//! An asynchronous client engine for the IRC line protocol over TCP or
//! TLS. The engine owns the connection lifecycle, reassembles the byte
//! stream into discrete frames, serializes outgoing lines so at most one
//! is in flight at a time, routes incoming frames to pluggable handlers,
//! and maintains a live model of the channels the client occupies.
//!
//! ## Features
//!
//! - Buffered partial-line reassembly with a bounded, compacting read
//!   buffer
//! - Strict FIFO outbound queue with a single in-flight write
//! - TLS upgrade via rustls, with an explicit opt-in insecure mode
//! - Case-insensitive command dispatch with overridable handlers and
//!   pre-dispatch raw observers
//! - Channel collection with RFC 1459 case-insensitive lookup and live
//!   membership views over a shared user pool
//! - Protocol keepalive (PING using the server's self-reported name) and
//!   TCP-level keepalive
//!
//! Per-command payload parsing is deliberately out of scope: handlers
//! receive the raw frame plus its command token and implement their own
//! semantics.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use slirc_client::{ClientConfig, NullUserPool, ServerAddr, Session};
//!
//! # async fn demo() -> Result<(), slirc_client::EngineError> {
//! let addr: ServerAddr = "irc.libera.chat:6667".parse()?;
//! let config = ClientConfig::new(addr, "example_bot");
//!
//! let (mut session, _events) = Session::new(config, Arc::new(NullUserPool));
//! session.connect().await?;
//! session.channels_mut().join("#rust")?;
//!
//! // Dispatch frames until the connection ends.
//! session.run().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Acknowledgments
//!
//! This project was inspired by the architectural patterns established by
//! [Aaron Weiss (aatxe)](https://github.com/aatxe) in the
//! [irc](https://github.com/aatxe/irc) crate. We are grateful for Aaron's
//! foundational work on IRC protocol handling in Rust.

#![deny(clippy::all)]

pub mod casemap;
pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod frame;
pub mod queue;
pub mod session;
pub mod transport;

pub use self::casemap::{irc_eq, irc_to_lower};
pub use self::channel::{ChannelCollection, IrcChannel, NullUserPool, UserPool};
pub use self::config::{ClientConfig, ServerAddr, DEFAULT_PORT};
pub use self::dispatch::{Context, DispatchRegistry, Frame, Handler, RawObserver};
pub use self::error::EngineError;
pub use self::event::EngineEvent;
pub use self::frame::{FrameReader, MAX_LINE_LEN};
pub use self::queue::{OutboundHandle, OutboundQueue};
pub use self::session::{Session, SessionState, KEEPALIVE_INTERVAL, READ_CHUNK_SIZE};
pub use self::transport::{Transport, TransportReader, TransportWriter};
