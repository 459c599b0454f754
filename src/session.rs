//! Session lifecycle: connect, read loop, write pump, keepalive,
//! dispatch, disconnect.
//!
//! A [`Session`] owns one logical client-to-server connection and its
//! state: the frame reader, the outbound queue, the dispatch registry, and
//! the channel collection. The lifecycle is
//! `Disconnected → Connecting → (TlsHandshake) → Connected →
//! Disconnecting → Disconnected`; a session may be reused by connecting
//! again after disconnect.
//!
//! Two tasks run per connection. The reader task issues 1024-byte reads,
//! feeds the [`FrameReader`], and forwards complete frames through an
//! unbounded channel — so the next socket read is always armed before any
//! handler runs, and a slow handler delays dispatch of later frames but
//! never their receipt. The writer task pumps the outbound queue and
//! carries the 30-second keepalive tick; both drain triggers claim lines
//! through the queue's single in-flight flag.
//!
//! Transport failures surface as one
//! [`EngineEvent::NetworkError`] and stop the affected loop; the session
//! never reconnects on its own. Failures observed after `disconnect` are
//! treated as benign and suppressed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::channel::{ChannelCollection, UserPool};
use crate::config::ClientConfig;
use crate::dispatch::{Context, DispatchRegistry, Frame};
use crate::error::{EngineError, Result};
use crate::event::EngineEvent;
use crate::frame::FrameReader;
use crate::queue::{OutboundHandle, OutboundQueue};
use crate::transport::{Transport, TransportReader, TransportWriter};

/// Interval between protocol-level keepalive PINGs.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Bytes requested per socket read.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Server name learned from a server-initiated PING, shared with the
/// keepalive timer.
pub(crate) type SharedServerName = Arc<Mutex<Option<String>>>;

/// Connection lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    TlsHandshake,
    Connected,
    Disconnecting,
}

/// One logical client-to-server connection and its owned state.
pub struct Session {
    config: ClientConfig,
    state: SessionState,
    registry: DispatchRegistry,
    channels: ChannelCollection,
    outbound: OutboundHandle,
    server_name: SharedServerName,
    events: UnboundedSender<EngineEvent>,
    frames: Option<UnboundedReceiver<String>>,
    reader_task: Option<JoinHandle<()>>,
    writer_task: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    /// Set by whichever side first reports the teardown, so collaborators
    /// see exactly one `Disconnected` per connection.
    close_reported: Arc<AtomicBool>,
}

impl Session {
    /// Create a disconnected session and the receiver for its events.
    ///
    /// `pool` is the shared user pool the channel membership views project
    /// over; pass [`NullUserPool`](crate::channel::NullUserPool) when
    /// membership is not tracked.
    pub fn new(
        config: ClientConfig,
        pool: Arc<dyn UserPool>,
    ) -> (Self, UnboundedReceiver<EngineEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let outbound = OutboundHandle::new();
        let channels = ChannelCollection::new(
            outbound.clone(),
            pool,
            config.message_prefix.clone(),
            true,
        );
        let session = Self {
            config,
            state: SessionState::Disconnected,
            registry: DispatchRegistry::with_defaults(),
            channels,
            outbound,
            server_name: SharedServerName::default(),
            events: events_tx,
            frames: None,
            reader_task: None,
            writer_task: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            close_reported: Arc::new(AtomicBool::new(false)),
        };
        (session, events_rx)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The handler registry, for collaborator modules to register
    /// per-command semantics.
    pub fn registry_mut(&mut self) -> &mut DispatchRegistry {
        &mut self.registry
    }

    pub fn channels(&self) -> &ChannelCollection {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut ChannelCollection {
        &mut self.channels
    }

    /// Cloneable submit handle to this session's outbound queue.
    pub fn outbound(&self) -> OutboundHandle {
        self.outbound.clone()
    }

    /// Submit a fully formatted protocol line (callers use `format!`).
    pub fn send_line(&self, line: impl Into<String>) -> Result<()> {
        self.outbound.send_line(line)
    }

    /// The server's self-reported name, once learned from a PING.
    pub fn server_name(&self) -> Option<String> {
        self.server_name
            .lock()
            .expect("server name mutex poisoned")
            .clone()
    }

    /// Open the connection and submit the login sequence.
    ///
    /// Fails fast with [`EngineError::AlreadyConnected`] unless the
    /// session is disconnected. On success the reader and writer tasks
    /// are running, `PASS` (when configured), `NICK`, and `USER` have
    /// been queued, and the keepalive timer is armed.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != SessionState::Disconnected {
            return Err(EngineError::AlreadyConnected);
        }
        self.shutdown.store(false, Ordering::Release);
        self.close_reported.store(false, Ordering::Release);
        self.state = SessionState::Connecting;
        debug!(server = %self.config.server, "connecting");

        let stream = match Transport::connect_tcp(&self.config.server).await {
            Ok(stream) => stream,
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(e);
            }
        };

        let transport = if self.config.use_tls {
            self.state = SessionState::TlsHandshake;
            match Transport::upgrade_tls(
                stream,
                &self.config.server.host,
                self.config.danger_accept_invalid_certs,
            )
            .await
            {
                Ok(transport) => transport,
                Err(e) => {
                    self.state = SessionState::Disconnected;
                    return Err(e);
                }
            }
        } else {
            Transport::Tcp(stream)
        };

        self.state = SessionState::Connected;
        let (reader, writer) = transport.split();
        self.outbound.attach();

        self.writer_task = Some(tokio::spawn(write_pump(
            writer,
            self.outbound.clone(),
            self.server_name.clone(),
            self.events.clone(),
            self.shutdown.clone(),
        )));

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        self.frames = Some(frames_rx);
        self.reader_task = Some(tokio::spawn(read_loop(
            reader,
            self.config.encoding.clone(),
            frames_tx,
            self.outbound.connected_flag().clone(),
            self.events.clone(),
            self.shutdown.clone(),
            self.close_reported.clone(),
        )));

        if let Some(password) = &self.config.password {
            self.outbound.send_line(format!("PASS {password}"))?;
        }
        self.outbound
            .send_line(format!("NICK {}", self.config.nickname))?;
        self.outbound.send_line(format!(
            "USER {} hostname servername :{}",
            self.config.username, self.config.realname
        ))?;

        let _ = self.events.send(EngineEvent::Connected);
        Ok(())
    }

    /// Drive dispatch until the connection ends.
    ///
    /// Frames are dispatched in wire order; handlers run synchronously
    /// here. Returns when the reader stops (peer close, transport error,
    /// or disconnect).
    pub async fn run(&mut self) {
        loop {
            let next = match self.frames.as_mut() {
                Some(rx) => rx.recv().await,
                None => return,
            };
            match next {
                Some(raw) => self.handle_line(raw),
                None => {
                    self.frames = None;
                    return;
                }
            }
        }
    }

    /// Dispatch one already-framed line (terminator stripped).
    ///
    /// Raises the raw-received notification, routes through the registry,
    /// and raises the unhandled notification when no handler matched.
    pub fn handle_line(&mut self, raw: String) {
        let frame = Frame::parse(raw);
        let _ = self.events.send(EngineEvent::RawReceived(frame.raw().to_string()));

        let Session {
            registry,
            channels,
            outbound,
            server_name,
            events,
            ..
        } = self;
        let mut ctx = Context::new(channels, outbound, server_name);
        if !registry.dispatch(&mut ctx, &frame) {
            let _ = events.send(EngineEvent::Unhandled(frame.raw().to_string()));
        }
    }

    /// Send `QUIT` (with the optional reason) and tear the connection
    /// down.
    ///
    /// The QUIT is fire-and-forget: it is flushed on the way out but no
    /// acknowledgment is awaited. Outstanding reads fail naturally once
    /// the socket goes away and are suppressed as benign.
    pub async fn disconnect(&mut self, reason: Option<&str>) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.state = SessionState::Disconnecting;

        let quit = match reason {
            Some(r) => format!("QUIT :{r}"),
            None => "QUIT".to_string(),
        };
        let _ = self.outbound.send_line(quit);

        self.shutdown.store(true, Ordering::Release);
        self.outbound.notify().notify_one();

        // The writer drains the queue (including the QUIT) before exiting.
        if let Some(task) = self.writer_task.take() {
            let _ = task.await;
        }
        self.outbound.detach();
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.frames = None;
        *self
            .server_name
            .lock()
            .expect("server name mutex poisoned") = None;

        self.state = SessionState::Disconnected;
        if !self.close_reported.swap(true, Ordering::AcqRel) {
            let _ = self.events.send(EngineEvent::Disconnected);
        }
    }
}

/// Reader task: fixed-size chunk reads, frame reassembly, forwarding.
///
/// Stops on end of stream, transport error, or frame-buffer overflow. The
/// frame channel closing (session dropped) also ends the loop.
async fn read_loop(
    mut reader: TransportReader,
    encoding: String,
    frames: UnboundedSender<String>,
    connected: Arc<AtomicBool>,
    events: UnboundedSender<EngineEvent>,
    shutdown: Arc<AtomicBool>,
    close_reported: Arc<AtomicBool>,
) {
    let mut framer = FrameReader::with_encoding(&encoding);
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                if !shutdown.load(Ordering::Acquire)
                    && !close_reported.swap(true, Ordering::AcqRel)
                {
                    debug!("peer closed the connection");
                    let _ = events.send(EngineEvent::Disconnected);
                }
                break;
            }
            Ok(n) => match framer.feed(&chunk[..n]) {
                Ok(lines) => {
                    for line in lines {
                        if frames.send(line).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = events.send(EngineEvent::NetworkError {
                        code: None,
                        message: e.to_string(),
                    });
                    break;
                }
            },
            Err(e) => {
                if !shutdown.load(Ordering::Acquire) {
                    let _ = events.send(EngineEvent::NetworkError {
                        code: e.raw_os_error(),
                        message: e.to_string(),
                    });
                }
                break;
            }
        }
    }
    connected.store(false, Ordering::Release);
}

/// Writer task: queue pump plus keepalive tick.
///
/// Both the completion path and the timer funnel through the queue's
/// `try_begin`, so at most one line is ever in flight and FIFO order is
/// preserved. The keepalive tick sends `PING :<servername>` only once the
/// server's self-reported name has been learned.
async fn write_pump(
    mut writer: TransportWriter,
    outbound: OutboundHandle,
    server_name: SharedServerName,
    events: UnboundedSender<EngineEvent>,
    shutdown: Arc<AtomicBool>,
) {
    let queue: Arc<OutboundQueue> = outbound.queue().clone();
    let notify = outbound.notify().clone();
    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; the server name is unknown then,
    // so it is a no-op.
    loop {
        while let Some(line) = queue.try_begin() {
            match writer.write_line(&line).await {
                Ok(()) => {
                    queue.complete();
                    let _ = events.send(EngineEvent::RawSent(line));
                }
                Err(e) => {
                    queue.complete();
                    if !shutdown.load(Ordering::Acquire) {
                        let _ = events.send(EngineEvent::NetworkError {
                            code: e.raw_os_error(),
                            message: e.to_string(),
                        });
                    }
                    outbound.connected_flag().store(false, Ordering::Release);
                    return;
                }
            }
        }

        if shutdown.load(Ordering::Acquire) && queue.is_empty() {
            break;
        }

        tokio::select! {
            _ = notify.notified() => {}
            _ = keepalive.tick() => {
                if !shutdown.load(Ordering::Acquire) {
                    let name = server_name
                        .lock()
                        .expect("server name mutex poisoned")
                        .clone();
                    if let Some(name) = name {
                        queue.push(format!("PING :{name}"));
                    }
                }
            }
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::NullUserPool;
    use crate::config::ServerAddr;

    fn make_session() -> (Session, UnboundedReceiver<EngineEvent>) {
        let config = ClientConfig::new(ServerAddr::new("irc.example.com", 6667), "tester");
        Session::new(config, Arc::new(NullUserPool))
    }

    #[test]
    fn test_new_session_is_disconnected() {
        let (session, _events) = make_session();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.server_name().is_none());
    }

    #[test]
    fn test_send_while_disconnected_fails() {
        let (session, _events) = make_session();
        match session.send_line("NICK tester") {
            Err(EngineError::NotConnected) => {}
            other => panic!("expected NotConnected, got {other:?}"),
        }
    }

    #[test]
    fn test_handle_line_raises_unhandled() {
        let (mut session, mut events) = make_session();
        session.handle_line("WALLOPS :maintenance".to_string());

        assert_eq!(
            events.try_recv().unwrap(),
            EngineEvent::RawReceived("WALLOPS :maintenance".to_string())
        );
        assert_eq!(
            events.try_recv().unwrap(),
            EngineEvent::Unhandled("WALLOPS :maintenance".to_string())
        );
    }

    #[test]
    fn test_handle_line_routes_to_registered_handler() {
        let (mut session, mut events) = make_session();
        session.registry_mut().set_handler(
            "JOIN",
            Box::new(|ctx, frame| {
                let name = frame.params().split(' ').next().unwrap_or("");
                ctx.channels.get_or_add(name);
            }),
        );

        session.handle_line("JOIN #rust".to_string());

        assert!(session.channels().contains("#rust"));
        assert_eq!(
            events.try_recv().unwrap(),
            EngineEvent::RawReceived("JOIN #rust".to_string())
        );
        // Handled: no Unhandled event follows.
        assert!(events.try_recv().is_err());
    }
}
