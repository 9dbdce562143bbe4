use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::oneshot;

use crate::errors::{CustomResult, Error, ResponseTimeoutSnafu, TransportSnafu};
use crate::modules::connection::{
    ConnectionState, Connector, DuplexConnection, FrameListener, CONNECT_TIMEOUT,
};

/// upper bound for waiting on a complete reply
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

type PendingReply = oneshot::Sender<CustomResult<String>>;

#[derive(Default)]
struct AssemblyState {
    buffer: String,
    pending: Option<PendingReply>,
}

/// # reply slot and fragment buffer
/// fragments are appended in arrival order until a terminal one completes the message.
/// the complete message goes to the pending caller, if there is one, and the buffer starts
/// over. the slot is taken on resolve and on fail, so it can only be resolved once.
#[derive(Default)]
pub struct ReplyAssembler {
    state: Mutex<AssemblyState>,
}

impl ReplyAssembler {
    fn lock(&self) -> MutexGuard<'_, AssemblyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// install a new pending slot and return the side that waits on it.
    /// leftovers of an abandoned message are dropped
    pub fn install(&self) -> oneshot::Receiver<CustomResult<String>> {
        let (sender, receiver) = oneshot::channel();
        let mut state = self.lock();
        state.buffer.clear();
        if state.pending.replace(sender).is_some() {
            warn!(target: "correlator", "Replaced a reply slot that was never resolved");
        }
        receiver
    }

    /// drop the pending slot without resolving it
    pub fn clear(&self) -> bool {
        self.lock().pending.take().is_some()
    }

    /// fail the pending caller, if any
    pub fn fail(&self, error: Error) -> bool {
        let mut state = self.lock();
        state.buffer.clear();
        match state.pending.take() {
            Some(sender) => {
                // the caller may already have given up
                let _ = sender.send(Err(error));
                true
            }
            None => false,
        }
    }

    pub fn is_awaiting(&self) -> bool {
        self.lock().pending.is_some()
    }
}

impl FrameListener for ReplyAssembler {
    fn on_text(&self, data: &str, last: bool) {
        let mut state = self.lock();
        state.buffer.push_str(data);
        if !last {
            return;
        }

        let message = std::mem::take(&mut state.buffer);
        match state.pending.take() {
            Some(sender) => {
                let _ = sender.send(Ok(message));
            }
            None => {
                debug!(target: "correlator", "Discarding unsolicited message ({} bytes)", message.len());
            }
        }
    }

    fn on_closed(&self, reason: &str) {
        self.fail(Error::TransportError {
            message: format!("connection closed by remote: {reason}"),
        });
    }

    fn on_error(&self, error: Error) {
        self.fail(error);
    }
}

/// # request/response over a duplex connection
/// the connection has no notion of request ids, so at most one request is outstanding
/// at any time. `request` takes `&mut self` which makes that a compile time guarantee.
pub struct Correlator<C: Connector> {
    connection: DuplexConnection<C>,
    assembler: Arc<ReplyAssembler>,
    response_timeout: Duration,
}

impl<C: Connector> Correlator<C> {
    pub fn new(connector: C) -> Self {
        Correlator::with_timeouts(connector, CONNECT_TIMEOUT, RESPONSE_TIMEOUT)
    }

    pub fn with_timeouts(connector: C, connect_timeout: Duration, response_timeout: Duration) -> Self {
        let assembler = Arc::new(ReplyAssembler::default());
        let connection = DuplexConnection::new(connector, assembler.clone(), connect_timeout);

        Correlator {
            connection,
            assembler,
            response_timeout,
        }
    }

    /// # send a request and wait for its reply
    ///
    /// ## Arguments
    /// * `payload` - the encoded request, sent as one frame
    ///
    /// ## Returns
    /// * `String` - the complete reply, all fragments joined in arrival order
    pub async fn request(&mut self, payload: String) -> CustomResult<String> {
        let handle = self.connection.ensure_connected().await?;

        let reply = self.assembler.install();
        if let Err(error) = self.connection.send(&handle, payload).await {
            self.assembler.clear();
            return Err(error);
        }

        match tokio::time::timeout(self.response_timeout, reply).await {
            Ok(Ok(Ok(message))) => Ok(message),
            Ok(Ok(Err(error))) => {
                self.connection.invalidate(&handle);
                Err(error)
            }
            Ok(Err(_)) => {
                self.connection.invalidate(&handle);
                TransportSnafu {
                    message: "reply slot dropped before it was resolved",
                }
                .fail()
            }
            Err(_) => {
                self.assembler.clear();
                warn!(target: "correlator", "No reply from {} within {:?}", self.connection.endpoint(), self.response_timeout);
                self.connection.invalidate(&handle);
                ResponseTimeoutSnafu {
                    timeout: self.response_timeout,
                }
                .fail()
            }
        }
    }

    /// # close the connection
    /// a caller still waiting for a reply is failed
    pub async fn close(&self) {
        self.connection.close().await;
        self.assembler.fail(Error::TransportError {
            message: "connection closed by client".to_string(),
        });
    }

    pub fn state(&self) -> ConnectionState {
        if self.assembler.is_awaiting() {
            ConnectionState::AwaitingReply
        } else {
            self.connection.state()
        }
    }

    pub fn endpoint(&self) -> &str {
        self.connection.endpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_are_joined_until_the_last_one() {
        let assembler = ReplyAssembler::default();
        let mut reply = assembler.install();

        assembler.on_text("{\"type\":", false);
        assert!(reply.try_recv().is_err());
        assembler.on_text("\"SUCCESS\"}", true);

        assert_eq!(reply.try_recv().unwrap().unwrap(), "{\"type\":\"SUCCESS\"}");
        assert!(!assembler.is_awaiting());
    }

    #[test]
    fn slot_is_resolved_only_once() {
        let assembler = ReplyAssembler::default();
        let mut reply = assembler.install();

        assembler.on_text("first", true);
        assert!(!assembler.fail(Error::TransportError {
            message: "late".to_string(),
        }));

        assert_eq!(reply.try_recv().unwrap().unwrap(), "first");
    }

    #[test]
    fn close_fails_the_waiting_caller() {
        let assembler = ReplyAssembler::default();
        let mut reply = assembler.install();

        assembler.on_text("partial", false);
        assembler.on_closed("going away");

        let error = reply.try_recv().unwrap().unwrap_err();
        assert_eq!(error.kind(), "TransportError");

        // the partial fragment must not leak into the next message
        let mut next = assembler.install();
        assembler.on_text("fresh", true);
        assert_eq!(next.try_recv().unwrap().unwrap(), "fresh");
    }

    #[test]
    fn unsolicited_messages_are_dropped() {
        let assembler = ReplyAssembler::default();

        assembler.on_text("nobody asked", true);
        let mut reply = assembler.install();
        assert!(reply.try_recv().is_err());

        assembler.on_text("answer", true);
        assert_eq!(reply.try_recv().unwrap().unwrap(), "answer");
    }
}
