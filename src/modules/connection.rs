use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{self, BoxFuture};
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::errors::{ConnectTimeoutSnafu, CustomResult, Error, TransportSnafu};

/// upper bound for establishing a connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// upper bound for the closing handshake on shutdown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// one inbound event delivered by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// a text fragment. `last` marks the fragment that completes a message
    Text { data: String, last: bool },
    /// the remote side closed the connection
    Closed { reason: String },
}

pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = CustomResult<Inbound>> + Send>>;

/// # transport factory
/// opens one duplex text channel to the remote endpoint per call
pub trait Connector: Send + Sync + 'static {
    fn endpoint(&self) -> &str;

    fn connect(&self) -> BoxFuture<'_, CustomResult<(FrameSink, FrameStream)>>;
}

/// receives everything the reader task of a connection sees
pub trait FrameListener: Send + Sync + 'static {
    fn on_text(&self, data: &str, last: bool);

    fn on_closed(&self, reason: &str);

    fn on_error(&self, error: Error);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    AwaitingReply,
}

struct Link {
    id: u64,
    sink: Mutex<FrameSink>,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

/// a live connection. cloning shares the same underlying link
#[derive(Clone)]
pub struct ConnectionHandle {
    link: Arc<Link>,
}

impl ConnectionHandle {
    pub fn id(&self) -> u64 {
        self.link.id
    }

    /// false once the reader saw an error or a close, or the handle was invalidated
    pub fn is_alive(&self) -> bool {
        self.link.alive.load(Ordering::SeqCst)
    }

    fn kill(&self) {
        self.link.alive.store(false, Ordering::SeqCst);
        self.link.reader.abort();
    }
}

/// # single connection to the telemetry source
/// holds at most one live link and only (re)connects when a caller asks for it.
/// there is no background reconnect loop: a dead link is replaced on the next
/// `ensure_connected` call.
pub struct DuplexConnection<C: Connector> {
    connector: C,
    listener: Arc<dyn FrameListener>,
    connect_timeout: Duration,
    /// serializes establishment so concurrent callers share one attempt
    establishing: Mutex<()>,
    /// set while an establishment is in flight
    connecting: AtomicBool,
    /// never held across an await
    current: StdMutex<Option<ConnectionHandle>>,
    next_id: AtomicU64,
}

/// clears the connecting flag even when the establishing future is dropped
struct ConnectingGuard<'a>(&'a AtomicBool);

impl<'a> ConnectingGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> ConnectingGuard<'a> {
        flag.store(true, Ordering::SeqCst);
        ConnectingGuard(flag)
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<C: Connector> DuplexConnection<C> {
    pub fn new(connector: C, listener: Arc<dyn FrameListener>, connect_timeout: Duration) -> Self {
        DuplexConnection {
            connector,
            listener,
            connect_timeout,
            establishing: Mutex::new(()),
            connecting: AtomicBool::new(false),
            current: StdMutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.connector.endpoint()
    }

    fn slot(&self) -> MutexGuard<'_, Option<ConnectionHandle>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// the current handle when it is still alive. a dead one is dropped from the slot
    fn live_handle(&self) -> Option<ConnectionHandle> {
        let mut current = self.slot();
        if let Some(handle) = current.as_ref().filter(|handle| handle.is_alive()) {
            return Some(handle.clone());
        }

        if let Some(dead) = current.take() {
            debug!(target: "connection", "Dropping dead connection {}", dead.id());
            dead.kill();
        }
        None
    }

    /// # get a live connection
    /// returns the current link when it is still alive, otherwise establishes a new one.
    /// establishment is serialized so concurrent callers share one attempt.
    ///
    /// ## Returns
    /// * `ConnectionHandle` - the live connection
    pub async fn ensure_connected(&self) -> CustomResult<ConnectionHandle> {
        if let Some(handle) = self.live_handle() {
            return Ok(handle);
        }

        let _establishing = self.establishing.lock().await;
        // another caller may have connected while this one waited
        if let Some(handle) = self.live_handle() {
            return Ok(handle);
        }

        let url = self.connector.endpoint().to_string();
        info!(target: "connection", "Connecting to {}", url);
        let connecting = ConnectingGuard::raise(&self.connecting);
        let connected = tokio::time::timeout(self.connect_timeout, self.connector.connect()).await;
        drop(connecting);

        let (sink, stream) = match connected {
            Ok(Ok(pair)) => pair,
            Ok(Err(error)) => {
                warn!(target: "connection", "Failed to connect to {}: {}", url, error);
                return Err(error);
            }
            Err(_) => {
                warn!(target: "connection", "Connecting to {} timed out after {:?}", url, self.connect_timeout);
                return ConnectTimeoutSnafu { url, timeout: self.connect_timeout }.fail();
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let alive = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_frames(id, stream, alive.clone(), self.listener.clone()));
        let handle = ConnectionHandle {
            link: Arc::new(Link {
                id,
                sink: Mutex::new(sink),
                alive,
                reader,
            }),
        };

        *self.slot() = Some(handle.clone());
        info!(target: "connection", "Connected to {} (connection {})", url, id);
        Ok(handle)
    }

    /// # send one text frame
    /// the frame is flushed before this returns. a failed write invalidates the handle.
    pub async fn send(&self, handle: &ConnectionHandle, text: String) -> CustomResult<()> {
        if !handle.is_alive() {
            return TransportSnafu {
                message: format!("connection {} is closed", handle.id()),
            }
            .fail();
        }

        let result = handle.link.sink.lock().await.send(text).await;
        if let Err(error) = result {
            error!(target: "connection", "Failed to send on connection {}: {}", handle.id(), error);
            self.invalidate(handle);
            return Err(error);
        }
        Ok(())
    }

    /// # forget a connection
    /// the next `ensure_connected` reconnects. a handle that was already replaced leaves
    /// the current connection untouched.
    pub fn invalidate(&self, handle: &ConnectionHandle) {
        handle.kill();

        let mut current = self.slot();
        if current.as_ref().map(ConnectionHandle::id) == Some(handle.id()) {
            debug!(target: "connection", "Invalidated connection {}", handle.id());
            *current = None;
        }
    }

    /// # close the connection
    /// best effort closing handshake. calling this without a live connection does nothing.
    pub async fn close(&self) {
        let handle = match self.slot().take() {
            Some(handle) => handle,
            None => return,
        };

        handle.link.alive.store(false, Ordering::SeqCst);
        let mut sink = handle.link.sink.lock().await;
        match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => info!(target: "connection", "Closed connection {}", handle.id()),
            Ok(Err(error)) => warn!(target: "connection", "Error closing connection {}: {}", handle.id(), error),
            Err(_) => warn!(target: "connection", "Closing connection {} timed out", handle.id()),
        }
        handle.kill();
    }

    pub fn state(&self) -> ConnectionState {
        if self.connecting.load(Ordering::SeqCst) {
            return ConnectionState::Connecting;
        }

        match self.slot().as_ref() {
            Some(handle) if handle.is_alive() => ConnectionState::Connected,
            _ => ConnectionState::Idle,
        }
    }
}

async fn read_frames(id: u64, mut stream: FrameStream, alive: Arc<AtomicBool>, listener: Arc<dyn FrameListener>) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(Inbound::Text { data, last }) => listener.on_text(&data, last),
            Ok(Inbound::Closed { reason }) => {
                alive.store(false, Ordering::SeqCst);
                info!(target: "connection", "Connection {} closed by remote: {}", id, reason);
                listener.on_closed(&reason);
                return;
            }
            Err(error) => {
                alive.store(false, Ordering::SeqCst);
                error!(target: "connection", "Connection {} failed: {}", id, error);
                listener.on_error(error);
                return;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    info!(target: "connection", "Connection {} ended", id);
    listener.on_closed("stream ended");
}

/// # websocket transport
/// tungstenite reassembles continuation frames itself, so every text message it hands
/// out is delivered as a single terminal fragment.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: &str) -> WsConnector {
        WsConnector { url: url.to_string() }
    }
}

impl Connector for WsConnector {
    fn endpoint(&self) -> &str {
        &self.url
    }

    fn connect(&self) -> BoxFuture<'_, CustomResult<(FrameSink, FrameStream)>> {
        Box::pin(async move {
            let (socket, _response) = connect_async(self.url.as_str()).await.map_err(|error| Error::ConnectError {
                url: self.url.clone(),
                message: error.to_string(),
            })?;
            let (sink, stream) = socket.split();

            let sink = sink
                .with(|text: String| future::ready(Ok::<Message, WsError>(Message::text(text))))
                .sink_map_err(|error| Error::TransportError {
                    message: error.to_string(),
                });

            let stream = stream.filter_map(|item| {
                future::ready(match item {
                    Ok(Message::Text(text)) => Some(Ok(Inbound::Text {
                        data: text.to_string(),
                        last: true,
                    })),
                    Ok(Message::Binary(bytes)) => Some(Ok(Inbound::Text {
                        data: String::from_utf8_lossy(&bytes).into_owned(),
                        last: true,
                    })),
                    Ok(Message::Close(frame)) => Some(Ok(Inbound::Closed {
                        reason: frame.map(|f| f.reason.to_string()).unwrap_or_default(),
                    })),
                    // ping/pong are answered by tungstenite
                    Ok(_) => None,
                    Err(error) => Some(Err(Error::TransportError {
                        message: error.to_string(),
                    })),
                })
            });

            Ok((Box::pin(sink) as FrameSink, Box::pin(stream) as FrameStream))
        })
    }
}
