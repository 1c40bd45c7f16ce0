//! WebSocket channel for one chat session
//!
//! The server drives the exchange. It announces `state: opened` when it
//! waits for input; the client may then send exactly one payload, after
//! which the channel is closed again until the next announcement. An `end`
//! payload or a dropped socket closes the channel for good.

use super::payload::{ChannelState, InboundFrame, PayloadKind};
use super::{ChannelError, SessionRef};
use crate::store::Store;
use crate::ClientContext;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Outgoing half of a connection.
pub trait FrameSink: Send + Sync {
    fn send_text(&self, text: String) -> Result<(), ChannelError>;
    fn close(&self);
}

/// Feeds the writer task of a live socket.
struct SocketSink {
    tx: mpsc::UnboundedSender<Message>,
}

impl FrameSink for SocketSink {
    fn send_text(&self, text: String) -> Result<(), ChannelError> {
        self.tx
            .send(Message::Text(text))
            .map_err(|_| ChannelError::SocketClosed)
    }

    fn close(&self) {
        // writer may already be gone
        let _ = self.tx.send(Message::Close(None));
    }
}

type SessionCreatedFn = Box<dyn Fn(i64) + Send + Sync>;
type PayloadFn = Box<dyn Fn(&Value) + Send + Sync>;

/// Caller hooks. Both default to doing nothing.
pub struct ChannelHandlers {
    on_session_created: SessionCreatedFn,
    on_payload: PayloadFn,
}

impl Default for ChannelHandlers {
    fn default() -> Self {
        Self {
            on_session_created: Box::new(|_| {}),
            on_payload: Box::new(|_| {}),
        }
    }
}

impl ChannelHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the id the server assigned to a new session.
    pub fn on_session_created<F>(mut self, f: F) -> Self
    where
        F: Fn(i64) + Send + Sync + 'static,
    {
        self.on_session_created = Box::new(f);
        self
    }

    /// Called with every inbound payload, after the channel handled it.
    pub fn on_payload<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on_payload = Box::new(f);
        self
    }
}

struct Connection {
    generation: u64,
    url: String,
    sink: Arc<dyn FrameSink>,
}

struct ChannelInner {
    ws_url: String,
    session: Mutex<SessionRef>,
    state: Store<ChannelState>,
    connection: Mutex<Option<Connection>>,
    /// Present only while the server waits for input.
    armed: Mutex<Option<Arc<dyn FrameSink>>>,
    finished: AtomicBool,
    generation: AtomicU64,
    handlers: ChannelHandlers,
}

#[derive(Clone)]
pub struct PayloadChannel {
    inner: Arc<ChannelInner>,
}

impl PayloadChannel {
    pub fn new(ws_url: &str, session: SessionRef, handlers: ChannelHandlers) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                ws_url: ws_url.trim_end_matches('/').to_string(),
                session: Mutex::new(session),
                state: Store::new(ChannelState::Closed),
                connection: Mutex::new(None),
                armed: Mutex::new(None),
                finished: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                handlers,
            }),
        }
    }

    /// Channel that connects as soon as an access token is available.
    pub fn attach(ctx: &ClientContext, session: SessionRef, handlers: ChannelHandlers) -> Self {
        let channel = Self::new(&ctx.settings().ws_url, session, handlers);

        let handle = channel.clone();
        ctx.access_token().subscribe(move |value| {
            let Some(token) = value.clone() else {
                return;
            };

            let handle = handle.clone();
            crate::spawn_detached(async move {
                if let Err(e) = handle.connect(&token).await {
                    log::error!("Chat connection failed: {}", e);
                }
            });
        });

        channel
    }

    pub fn state(&self) -> &Store<ChannelState> {
        &self.inner.state
    }

    pub fn is_opened(&self) -> bool {
        self.inner.state.get() == ChannelState::Opened
    }

    pub fn session(&self) -> SessionRef {
        self.inner
            .session
            .lock()
            .map(|s| *s)
            .unwrap_or(SessionRef::New)
    }

    /// True once the server sent `end` on the current connection.
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::SeqCst)
    }

    /// URL of the current connection, if any.
    pub fn connected_url(&self) -> Option<String> {
        self.inner
            .connection
            .lock()
            .ok()
            .and_then(|conn| conn.as_ref().map(|c| c.url.clone()))
    }

    pub fn chat_url(&self, token: &str) -> Result<String, ChannelError> {
        let raw = format!("{}/chat/{}", self.inner.ws_url, self.session());
        let mut url = url::Url::parse(&raw).map_err(|e| ChannelError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url.to_string())
    }

    /// Open a socket for this session, replacing any previous one.
    pub async fn connect(&self, token: &str) -> Result<(), ChannelError> {
        let url = self.chat_url(token)?;

        if self.take_connection().is_some() {
            log::info!("Closing previous connection");
        }

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::ConnectionError(e.to_string()))?;

        log::info!("Connected to chat session {}", self.session());

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let generation = self.install(Arc::new(SocketSink { tx }), url);

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = write.send(message).await {
                    log::debug!("Chat socket write failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let channel = self.clone();
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => channel.handle_text(generation, &text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        log::debug!("Chat socket read failed: {}", e);
                        break;
                    }
                }
            }
            channel.handle_transport_closed(generation);
        });

        Ok(())
    }

    /// Close the socket and drop back to `Closed`.
    pub fn disconnect(&self) {
        if let Some(conn) = self.take_connection() {
            log::info!("Disconnecting from {}", conn.url);
        }
    }

    /// Send one payload while the server waits for input.
    ///
    /// Returns `Ok(false)` without transmitting anything when the channel is
    /// closed. A successful send closes the channel until the server opens it
    /// again.
    pub fn send<P: Serialize>(&self, payload: &P) -> Result<bool, ChannelError> {
        let text = serde_json::to_string(payload)?;

        let sink = match self.inner.armed.lock() {
            Ok(mut armed) => armed.take(),
            Err(_) => None,
        };
        let Some(sink) = sink else {
            log::debug!("Send ignored, channel is closed");
            return Ok(false);
        };

        log::debug!("Sending payload {}", text);
        let result = sink.send_text(text);
        self.inner.state.set(ChannelState::Closed);
        result.map(|_| true)
    }

    /// Register a sink as the current connection and return its generation.
    pub(crate) fn install(&self, sink: Arc<dyn FrameSink>, url: String) -> u64 {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.finished.store(false, Ordering::SeqCst);

        let previous = match self.inner.connection.lock() {
            Ok(mut conn) => conn.replace(Connection {
                generation,
                url,
                sink,
            }),
            Err(_) => None,
        };
        if let Some(previous) = previous {
            previous.sink.close();
        }

        generation
    }

    fn take_connection(&self) -> Option<Connection> {
        let conn = self.inner.connection.lock().ok().and_then(|mut c| c.take());
        if let Some(conn) = &conn {
            conn.sink.close();
        }
        self.close_exchange();
        conn
    }

    fn current_sink(&self, generation: u64) -> Option<Arc<dyn FrameSink>> {
        let conn = self.inner.connection.lock().ok()?;
        conn.as_ref()
            .filter(|c| c.generation == generation)
            .map(|c| Arc::clone(&c.sink))
    }

    fn open_exchange(&self, sink: Arc<dyn FrameSink>) {
        if let Ok(mut armed) = self.inner.armed.lock() {
            *armed = Some(sink);
        }
        log::debug!("Channel opened");
        self.inner.state.set(ChannelState::Opened);
    }

    fn close_exchange(&self) {
        if let Ok(mut armed) = self.inner.armed.lock() {
            *armed = None;
        }
        self.inner.state.set(ChannelState::Closed);
    }

    /// Process one inbound text frame of connection `generation`.
    pub(crate) fn handle_text(&self, generation: u64, text: &str) {
        let Some(sink) = self.current_sink(generation) else {
            log::debug!("Dropping frame from stale connection {}", generation);
            return;
        };

        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Ignoring malformed chat frame: {}", e);
                return;
            }
        };
        log::debug!("Received payload {}", frame.payload);

        match PayloadKind::classify(&frame.payload) {
            PayloadKind::State(ChannelState::Opened) => self.open_exchange(sink),
            PayloadKind::State(ChannelState::Closed) => self.close_exchange(),
            PayloadKind::SessionCreated(id) => {
                if let Ok(mut session) = self.inner.session.lock() {
                    *session = SessionRef::Existing(id);
                }
                log::info!("Session {} created", id);
                (self.inner.handlers.on_session_created)(id);
            }
            PayloadKind::End => {
                self.inner.finished.store(true, Ordering::SeqCst);
                sink.close();
                self.close_exchange();
            }
            PayloadKind::Other => {}
        }

        (self.inner.handlers.on_payload)(&frame.payload);
    }

    /// The transport of connection `generation` went away.
    pub(crate) fn handle_transport_closed(&self, generation: u64) {
        if self.current_sink(generation).is_none() {
            return;
        }

        if !self.is_finished() {
            log::info!("Connection closed forcibly");
        }
        if let Ok(mut conn) = self.inner.connection.lock() {
            conn.take();
        }
        self.close_exchange();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<String>>,
        closes: AtomicUsize,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        fn closed(&self) -> bool {
            self.closes.load(Ordering::SeqCst) > 0
        }
    }

    impl FrameSink for RecordingSink {
        fn send_text(&self, text: String) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(text);
            Ok(())
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn frame(payload: Value) -> String {
        json!({"payload": payload, "id": 1, "is_system": true}).to_string()
    }

    fn channel_with_sink(handlers: ChannelHandlers) -> (PayloadChannel, Arc<RecordingSink>, u64) {
        let channel = PayloadChannel::new("ws://chat.test", SessionRef::Existing(3), handlers);
        let sink = Arc::new(RecordingSink::default());
        let generation = channel.install(sink.clone(), "ws://chat.test/chat/3".to_string());
        (channel, sink, generation)
    }

    #[test]
    fn test_chat_url() {
        let channel = PayloadChannel::new("ws://chat.test/", SessionRef::New, ChannelHandlers::new());
        assert_eq!(
            channel.chat_url("a b").unwrap(),
            "ws://chat.test/chat/-1?token=a+b"
        );

        let channel = PayloadChannel::new("wss://chat.test", SessionRef::Existing(9), ChannelHandlers::new());
        assert_eq!(channel.chat_url("jwt").unwrap(), "wss://chat.test/chat/9?token=jwt");
    }

    #[test]
    fn test_initially_closed_and_send_is_noop() {
        let (channel, sink, _) = channel_with_sink(ChannelHandlers::new());

        assert_eq!(channel.state().get(), ChannelState::Closed);
        assert!(!channel.send(&json!({"type": "message", "message": "hi"})).unwrap());
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_opened_then_one_shot_send() {
        let (channel, sink, generation) = channel_with_sink(ChannelHandlers::new());

        channel.handle_text(generation, &frame(json!({"type": "state", "state": "opened"})));
        assert_eq!(channel.state().get(), ChannelState::Opened);

        assert!(channel.send(&json!({"type": "message", "message": "hi"})).unwrap());
        assert_eq!(channel.state().get(), ChannelState::Closed);
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            serde_json::from_str::<Value>(&sent[0]).unwrap(),
            json!({"type": "message", "message": "hi"})
        );

        // second send needs a new opened announcement
        assert!(!channel.send(&json!({"type": "message", "message": "again"})).unwrap());
        assert_eq!(sink.sent().len(), 1);
    }

    #[test]
    fn test_state_closed_disarms() {
        let (channel, sink, generation) = channel_with_sink(ChannelHandlers::new());

        channel.handle_text(generation, &frame(json!({"type": "state", "state": "opened"})));
        channel.handle_text(generation, &frame(json!({"type": "state", "state": "closed"})));

        assert_eq!(channel.state().get(), ChannelState::Closed);
        assert!(!channel.send(&json!({"type": "message", "message": "late"})).unwrap());
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_end_closes_socket_from_any_state() {
        for opened_first in [false, true] {
            let (channel, sink, generation) = channel_with_sink(ChannelHandlers::new());
            if opened_first {
                channel.handle_text(generation, &frame(json!({"type": "state", "state": "opened"})));
            }

            channel.handle_text(generation, &frame(json!({"type": "end"})));

            assert_eq!(channel.state().get(), ChannelState::Closed);
            assert!(sink.closed());
            assert!(channel.is_finished());
            assert!(!channel.send(&json!({"type": "message", "message": "x"})).unwrap());
        }
    }

    #[test]
    fn test_session_created_keeps_state_and_notifies() {
        let created = Arc::new(Mutex::new(Vec::new()));
        let created_clone = Arc::clone(&created);
        let handlers = ChannelHandlers::new().on_session_created(move |id| {
            created_clone.lock().unwrap().push(id);
        });
        let (channel, _sink, generation) = channel_with_sink(handlers);

        channel.handle_text(generation, &frame(json!({"type": "state", "state": "opened"})));
        channel.handle_text(generation, &frame(json!({"type": "session_created", "id": 77})));

        assert_eq!(*created.lock().unwrap(), vec![77]);
        assert_eq!(channel.state().get(), ChannelState::Opened);
        assert_eq!(channel.session(), SessionRef::Existing(77));
    }

    #[test]
    fn test_every_payload_forwarded_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let handlers = ChannelHandlers::new().on_payload(move |payload| {
            seen_clone.lock().unwrap().push(payload.clone());
        });
        let (channel, _sink, generation) = channel_with_sink(handlers);

        let payloads = vec![
            json!({"type": "connected"}),
            json!({"type": "message", "message": "hello"}),
            json!({"type": "state", "state": "opened"}),
            json!({"type": "dict", "data": {"k": 1}}),
            json!({"type": "end"}),
        ];
        for payload in &payloads {
            channel.handle_text(generation, &frame(payload.clone()));
        }

        assert_eq!(*seen.lock().unwrap(), payloads);
    }

    #[test]
    fn test_malformed_frame_ignored() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let handlers = ChannelHandlers::new().on_payload(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });
        let (channel, _sink, generation) = channel_with_sink(handlers);

        channel.handle_text(generation, "not json");
        channel.handle_text(generation, r#"{"id": 1}"#);

        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_forced_close_tears_down() {
        let (channel, sink, generation) = channel_with_sink(ChannelHandlers::new());
        channel.handle_text(generation, &frame(json!({"type": "state", "state": "opened"})));

        channel.handle_transport_closed(generation);

        assert_eq!(channel.state().get(), ChannelState::Closed);
        assert_eq!(channel.connected_url(), None);
        assert!(!channel.send(&json!({"type": "message", "message": "x"})).unwrap());
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_stale_connection_events_ignored() {
        let (channel, old_sink, old_generation) = channel_with_sink(ChannelHandlers::new());
        let new_sink = Arc::new(RecordingSink::default());
        let new_generation = channel.install(new_sink.clone(), "ws://chat.test/chat/3".to_string());

        assert!(old_sink.closed());

        channel.handle_text(new_generation, &frame(json!({"type": "state", "state": "opened"})));
        channel.handle_text(old_generation, &frame(json!({"type": "state", "state": "closed"})));
        channel.handle_transport_closed(old_generation);

        assert_eq!(channel.state().get(), ChannelState::Opened);
        assert!(channel.send(&json!({"type": "message", "message": "ok"})).unwrap());
        assert_eq!(new_sink.sent().len(), 1);
        assert!(old_sink.sent().is_empty());
    }

    #[test]
    fn test_disconnect() {
        let (channel, sink, generation) = channel_with_sink(ChannelHandlers::new());
        channel.handle_text(generation, &frame(json!({"type": "state", "state": "opened"})));

        channel.disconnect();

        assert!(sink.closed());
        assert_eq!(channel.state().get(), ChannelState::Closed);
        assert_eq!(channel.connected_url(), None);
        assert!(!channel.send(&json!({"type": "message", "message": "x"})).unwrap());
    }
}
