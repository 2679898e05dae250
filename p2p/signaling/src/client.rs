//! Signaling client handle
//!
//! [`SignalingClient`] owns the I/O thread; [`SignalingSender`] is a cheap
//! clonable handle for publishing; [`MessageStream`] yields everything that
//! arrives on subscribed topics.

use crate::config::SignalingConfig;
use crate::error::{Result, SignalingError};
use crate::io_thread::{SignalingThreadParams, run_signaling_thread};
use crate::message::{SignalingMessage, TransportHints};
use crate::topics::inbox_topic;
use logging::Logger;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{
    Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError, sync_channel,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Connection state as seen by the I/O thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting = 0,
    Connected = 1,
    Reconnecting = 2,
    /// The broker refused the identity; the client will not retry.
    Rejected = 3,
    Closed = 4,
}

impl ConnectionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionStatus::Connecting,
            1 => ConnectionStatus::Connected,
            2 => ConnectionStatus::Reconnecting,
            3 => ConnectionStatus::Rejected,
            _ => ConnectionStatus::Closed,
        }
    }

    pub(crate) fn store(self, cell: &AtomicU8) {
        cell.store(self as u8, Ordering::SeqCst);
    }

    pub(crate) fn load(cell: &AtomicU8) -> Self {
        Self::from_u8(cell.load(Ordering::SeqCst))
    }
}

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A signaling message addressed to this phone's inbox.
    Signaling(SignalingMessage),
    /// Anything else, handed to the application untouched.
    Application { topic: String, payload: Vec<u8> },
}

/// Requests from the client handles to the I/O thread.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundRequest {
    Publish { topic: String, payload: Vec<u8> },
    Subscribe { topic: String },
    Shutdown,
}

/// Clonable publishing handle.
#[derive(Clone)]
pub struct SignalingSender {
    phone_id: String,
    topic_prefix: String,
    outbound: SyncSender<OutboundRequest>,
    status: Arc<AtomicU8>,
}

impl SignalingSender {
    pub fn phone_id(&self) -> &str {
        &self.phone_id
    }

    /// Inbox topic of `device_id` under this client's prefix.
    pub fn inbox_topic(&self, device_id: &str) -> String {
        inbox_topic(&self.topic_prefix, device_id)
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::load(&self.status)
    }

    /// Publishes a signaling message into the inbox of `device_id`.
    pub fn send(&self, device_id: &str, message: &SignalingMessage) -> Result<()> {
        let payload = message.to_json()?;
        self.publish(&self.inbox_topic(device_id), payload)
    }

    /// Sends an offer for `session_id` to `device_id`.
    pub fn send_offer(&self, device_id: &str, session_id: &str, hints: TransportHints) -> Result<()> {
        let offer = SignalingMessage::Offer {
            session_id: session_id.to_string(),
            from: self.phone_id.clone(),
            hints,
        };
        self.send(device_id, &offer)
    }

    /// Queues a raw publish. Never blocks.
    ///
    /// # Errors
    ///
    /// * `QueueFull` - The I/O thread is behind
    /// * `Closed` - The client was shut down or rejected
    pub fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.request(OutboundRequest::Publish {
            topic: topic.to_string(),
            payload,
        })
    }

    /// Adds a subscription; it survives reconnects.
    pub fn subscribe(&self, topic: &str) -> Result<()> {
        self.request(OutboundRequest::Subscribe {
            topic: topic.to_string(),
        })
    }

    fn request(&self, request: OutboundRequest) -> Result<()> {
        if matches!(
            self.status(),
            ConnectionStatus::Closed | ConnectionStatus::Rejected
        ) {
            return Err(SignalingError::Closed);
        }
        self.outbound.try_send(request).map_err(|e| match e {
            TrySendError::Full(_) => SignalingError::QueueFull,
            TrySendError::Disconnected(_) => SignalingError::Closed,
        })
    }
}

/// Lazy sequence of inbound messages; ends when the connection is closed.
pub struct MessageStream {
    rx: Receiver<Inbound>,
}

impl MessageStream {
    pub fn recv_timeout(&self, timeout: Duration) -> std::result::Result<Inbound, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_next(&self) -> std::result::Result<Inbound, TryRecvError> {
        self.rx.try_recv()
    }

    /// Only the signaling messages, skipping application traffic.
    pub fn signaling_only(self) -> impl Iterator<Item = SignalingMessage> {
        self.filter_map(|inbound| match inbound {
            Inbound::Signaling(message) => Some(message),
            Inbound::Application { .. } => None,
        })
    }
}

impl Iterator for MessageStream {
    type Item = Inbound;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}

/// MQTT signaling connection for one phone identity.
pub struct SignalingClient {
    sender: SignalingSender,
    inbox: Option<Receiver<Inbound>>,
    io_handle: Option<JoinHandle<()>>,
    logger: Logger,
}

impl SignalingClient {
    /// Connects to the broker and subscribes to the phone's inbox.
    ///
    /// Retries with backoff until `connect_timeout_ms` has elapsed. Once the
    /// first session is up, later drops are retried in the background for
    /// the lifetime of the client.
    ///
    /// # Errors
    ///
    /// * `AuthRejected` - The broker refused `phone_id`
    /// * `Unreachable` - No session could be opened within the connect window
    pub fn connect(config: &SignalingConfig, phone_id: &str, logger: &Logger) -> Result<Self> {
        if phone_id.trim().is_empty() {
            return Err(SignalingError::InvalidMessage(
                "phone id must not be empty".to_string(),
            ));
        }
        let logger = logger.for_component("SIGNALING");

        let (outbound_tx, outbound_rx) = sync_channel(config.outbound_capacity.max(1));
        let (inbox_tx, inbox_rx) = sync_channel(config.inbox_capacity.max(1));
        let (ready_tx, ready_rx) = sync_channel(1);
        let status = Arc::new(AtomicU8::new(ConnectionStatus::Connecting as u8));

        let params = SignalingThreadParams {
            config: config.clone(),
            phone_id: phone_id.to_string(),
            outbound: outbound_rx,
            inbox: inbox_tx,
            status: Arc::clone(&status),
            ready: ready_tx,
            logger: logger.clone(),
        };

        let io_handle = thread::Builder::new()
            .name("signaling-io".to_string())
            .spawn(move || run_signaling_thread(params))
            .map_err(|e| SignalingError::Unreachable(format!("failed to spawn I/O thread: {}", e)))?;

        let mut client = Self {
            sender: SignalingSender {
                phone_id: phone_id.to_string(),
                topic_prefix: config.topic_prefix.clone(),
                outbound: outbound_tx,
                status,
            },
            inbox: Some(inbox_rx),
            io_handle: Some(io_handle),
            logger,
        };

        // The I/O thread bounds its own window; the slack covers a TCP
        // connect that started just before the deadline.
        let wait = config.connect_timeout() + Duration::from_secs(2);
        match ready_rx.recv_timeout(wait) {
            Ok(Ok(())) => Ok(client),
            Ok(Err(e)) => {
                client.join_io_thread();
                Err(e)
            }
            Err(_) => {
                client.disconnect();
                Err(SignalingError::Unreachable(
                    "connect window elapsed".to_string(),
                ))
            }
        }
    }

    /// Creates a client wired to an in-process [`LoopbackBroker`] instead of
    /// a TCP broker.
    pub fn in_memory(phone_id: &str, topic_prefix: &str) -> (Self, LoopbackBroker) {
        let (outbound_tx, outbound_rx) = sync_channel(256);
        let (inbox_tx, inbox_rx) = sync_channel(256);
        let status = Arc::new(AtomicU8::new(ConnectionStatus::Connected as u8));

        let client = Self {
            sender: SignalingSender {
                phone_id: phone_id.to_string(),
                topic_prefix: topic_prefix.to_string(),
                outbound: outbound_tx,
                status: Arc::clone(&status),
            },
            inbox: Some(inbox_rx),
            io_handle: None,
            logger: Logger::disabled(),
        };
        let broker = LoopbackBroker {
            phone_id: phone_id.to_string(),
            topic_prefix: topic_prefix.to_string(),
            published: outbound_rx,
            inbox: inbox_tx,
            status,
        };
        (client, broker)
    }

    pub fn phone_id(&self) -> &str {
        self.sender.phone_id()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.sender.status()
    }

    pub fn sender(&self) -> SignalingSender {
        self.sender.clone()
    }

    /// Takes the inbound message stream. Only the first call returns it.
    pub fn messages(&mut self) -> Option<MessageStream> {
        self.inbox.take().map(|rx| MessageStream { rx })
    }

    /// Sends DISCONNECT and stops the I/O thread. Idempotent.
    pub fn disconnect(&mut self) {
        if self.io_handle.is_none() {
            ConnectionStatus::Closed.store(&self.sender.status);
            return;
        }
        // Blocking send: the I/O thread drains the queue at least every 50ms.
        let _ = self.sender.outbound.send(OutboundRequest::Shutdown);
        self.join_io_thread();
        self.logger.info("Signaling client disconnected");
    }

    fn join_io_thread(&mut self) {
        if let Some(handle) = self.io_handle.take()
            && handle.join().is_err()
        {
            self.logger.error("Signaling I/O thread panicked");
        }
        ConnectionStatus::Closed.store(&self.sender.status);
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Test double standing in for the broker and the remote devices.
///
/// Everything the client publishes can be read back with
/// [`next_published`](Self::next_published); messages injected with
/// [`deliver`](Self::deliver) show up on the client's [`MessageStream`].
pub struct LoopbackBroker {
    phone_id: String,
    topic_prefix: String,
    published: Receiver<OutboundRequest>,
    inbox: SyncSender<Inbound>,
    status: Arc<AtomicU8>,
}

impl LoopbackBroker {
    /// Delivers a signaling message into the phone's inbox.
    pub fn deliver(&self, message: SignalingMessage) -> Result<()> {
        self.push(Inbound::Signaling(message))
    }

    /// Delivers an arbitrary publish on `topic`.
    pub fn deliver_application(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.push(Inbound::Application {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        })
    }

    /// Next publish made by the client, skipping subscriptions.
    pub fn next_published(&self, timeout: Duration) -> Option<(String, Vec<u8>)> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match self.published.recv_timeout(remaining) {
                Ok(OutboundRequest::Publish { topic, payload }) => return Some((topic, payload)),
                Ok(OutboundRequest::Subscribe { .. }) => continue,
                Ok(OutboundRequest::Shutdown) => {
                    ConnectionStatus::Closed.store(&self.status);
                    return None;
                }
                Err(_) => return None,
            }
        }
    }

    /// Next publish that parses as a signaling message, with its topic.
    pub fn next_signaling(&self, timeout: Duration) -> Option<(String, SignalingMessage)> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            let (topic, payload) = self.next_published(remaining)?;
            if let Ok(message) = SignalingMessage::from_json(&payload) {
                return Some((topic, message));
            }
        }
    }

    /// Inbox topic of the phone this broker serves.
    pub fn phone_inbox(&self) -> String {
        inbox_topic(&self.topic_prefix, &self.phone_id)
    }

    fn push(&self, inbound: Inbound) -> Result<()> {
        self.inbox.try_send(inbound).map_err(|e| match e {
            TrySendError::Full(_) => SignalingError::QueueFull,
            TrySendError::Disconnected(_) => SignalingError::Closed,
        })
    }
}
