//! Signaling I/O thread
//!
//! Owns the TCP socket. Each pass of the loop drains the outbound queue,
//! reads whatever the broker sent (50ms read timeout) and services the MQTT
//! keep-alive. A dropped session is re-opened with backoff and every
//! subscription is restored.

use crate::backoff::Backoff;
use crate::client::{ConnectionStatus, Inbound, OutboundRequest};
use crate::config::SignalingConfig;
use crate::error::{Result, SignalingError};
use crate::message::SignalingMessage;
use crate::mqtt::{Connect, ConnectReturnCode, Packet, Publish, QoS};
use crate::topics::{inbox_owner, inbox_topic};
use logging::Logger;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::AtomicU8;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const READ_CHUNK: usize = 4096;

/// Parameters for the signaling I/O thread
pub(crate) struct SignalingThreadParams {
    pub config: SignalingConfig,
    pub phone_id: String,
    pub outbound: Receiver<OutboundRequest>,
    pub inbox: SyncSender<Inbound>,
    pub status: Arc<AtomicU8>,
    /// Receives the outcome of the initial connect window exactly once.
    pub ready: SyncSender<Result<()>>,
    pub logger: Logger,
}

/// Why a session ended.
enum SessionEnd {
    Shutdown,
    Dropped(String),
}

/// State that outlives individual TCP sessions.
struct IoState {
    subscriptions: Vec<String>,
    pending: VecDeque<(String, Vec<u8>)>,
    pending_limit: usize,
    next_packet_id: u16,
    inbound_count: u64,
}

impl IoState {
    fn packet_id(&mut self) -> u16 {
        self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
        self.next_packet_id
    }

    fn add_subscription(&mut self, topic: String) -> bool {
        if self.subscriptions.contains(&topic) {
            return false;
        }
        self.subscriptions.push(topic);
        true
    }

    fn queue_publish(&mut self, topic: String, payload: Vec<u8>, logger: &Logger) {
        if self.pending.len() >= self.pending_limit {
            self.pending.pop_front();
            logger.warn("Offline publish queue full, dropping oldest message");
        }
        self.pending.push_back((topic, payload));
    }

    /// Writes queued publishes in order. A publish leaves the queue only
    /// once it has been written.
    fn flush_pending(&mut self, stream: &mut impl Write) -> Result<usize> {
        let mut flushed = 0;
        while let Some((topic, payload)) = self.pending.front() {
            let publish = Packet::Publish(Publish::at_most_once(topic, payload.clone()));
            write_packet(stream, &publish)?;
            self.pending.pop_front();
            flushed += 1;
        }
        Ok(flushed)
    }
}

pub(crate) fn run_signaling_thread(params: SignalingThreadParams) {
    params.logger.info(&format!(
        "Signaling thread started for '{}' ({})",
        params.phone_id,
        params.config.broker_address()
    ));

    let mut state = IoState {
        subscriptions: vec![inbox_topic(&params.config.topic_prefix, &params.phone_id)],
        pending: VecDeque::new(),
        pending_limit: params.config.outbound_capacity.max(1),
        next_packet_id: 0,
        inbound_count: 0,
    };
    let mut backoff = Backoff::new(params.config.reconnect);

    let Some(mut stream) = connect_within_window(&params, &mut state, &mut backoff) else {
        ConnectionStatus::Closed.store(&params.status);
        return;
    };

    loop {
        match run_session(&mut stream, &params, &mut state) {
            SessionEnd::Shutdown => {
                let _ = stream.write_all(&Packet::Disconnect.encode());
                let _ = stream.shutdown(Shutdown::Both);
                break;
            }
            SessionEnd::Dropped(reason) => {
                let _ = stream.shutdown(Shutdown::Both);
                ConnectionStatus::Reconnecting.store(&params.status);
                params
                    .logger
                    .warn(&format!("Broker connection lost: {}", reason));
            }
        }

        match reconnect(&params, &mut state, &mut backoff) {
            Some(next) => stream = next,
            None => break,
        }
    }

    if ConnectionStatus::load(&params.status) != ConnectionStatus::Rejected {
        ConnectionStatus::Closed.store(&params.status);
    }
    params.logger.info("Signaling thread stopped");
}

/// Tries to open the first session before `connect_timeout_ms` runs out and
/// reports the outcome on the ready channel.
fn connect_within_window(
    params: &SignalingThreadParams,
    state: &mut IoState,
    backoff: &mut Backoff,
) -> Option<TcpStream> {
    let deadline = Instant::now() + params.config.connect_timeout();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let attempt = if remaining.is_zero() {
            Err(SignalingError::Unreachable("connect window elapsed".to_string()))
        } else {
            open_session(params, state, remaining)
        };

        match attempt {
            Ok(stream) => {
                backoff.reset();
                ConnectionStatus::Connected.store(&params.status);
                params.logger.info("Connected to broker");
                let _ = params.ready.send(Ok(()));
                return Some(stream);
            }
            Err(e) if e.is_retryable() && Instant::now() < deadline => {
                let delay = backoff
                    .next_delay()
                    .min(deadline.saturating_duration_since(Instant::now()));
                params.logger.debug(&format!(
                    "Connect attempt {} failed ({}), retrying in {:?}",
                    backoff.attempts(),
                    e,
                    delay
                ));
                if wait_or_shutdown(delay, params, state) {
                    let _ = params.ready.send(Err(SignalingError::Closed));
                    return None;
                }
            }
            Err(e) => {
                if matches!(e, SignalingError::AuthRejected(_)) {
                    ConnectionStatus::Rejected.store(&params.status);
                }
                params.logger.error(&format!("Connect failed: {}", e));
                let _ = params.ready.send(Err(e));
                return None;
            }
        }
    }
}

/// Re-opens a dropped session, waiting out the backoff between attempts.
/// Returns `None` on shutdown or a fatal refusal.
fn reconnect(
    params: &SignalingThreadParams,
    state: &mut IoState,
    backoff: &mut Backoff,
) -> Option<TcpStream> {
    loop {
        let delay = backoff.next_delay();
        params.logger.info(&format!(
            "Reconnecting in {:?} (attempt {})",
            delay,
            backoff.attempts()
        ));
        if wait_or_shutdown(delay, params, state) {
            return None;
        }

        match open_session(params, state, params.config.connect_timeout()) {
            Ok(stream) => {
                backoff.reset();
                ConnectionStatus::Connected.store(&params.status);
                params.logger.info(&format!(
                    "Reconnected, restored {} subscription(s)",
                    state.subscriptions.len()
                ));
                return Some(stream);
            }
            Err(e) if e.is_fatal() => {
                ConnectionStatus::Rejected.store(&params.status);
                params
                    .logger
                    .error(&format!("Broker refused reconnect, giving up: {}", e));
                return None;
            }
            Err(e) => {
                params.logger.warn(&format!("Reconnect failed: {}", e));
            }
        }
    }
}

/// Connects, authenticates and restores subscriptions and queued publishes.
fn open_session(
    params: &SignalingThreadParams,
    state: &mut IoState,
    timeout: Duration,
) -> Result<TcpStream> {
    let address = params
        .config
        .broker_address()
        .to_socket_addrs()
        .map_err(|e| SignalingError::Unreachable(format!("cannot resolve broker: {}", e)))?
        .next()
        .ok_or_else(|| SignalingError::Unreachable("broker address did not resolve".to_string()))?;

    let mut stream = TcpStream::connect_timeout(&address, timeout)
        .map_err(|e| SignalingError::Unreachable(e.to_string()))?;
    let _ = stream.set_nodelay(true);
    stream
        .set_read_timeout(Some(POLL_INTERVAL))
        .map_err(|e| SignalingError::Unreachable(e.to_string()))?;

    let connect = Packet::Connect(Connect {
        client_id: params.phone_id.clone(),
        keep_alive: params.config.keep_alive_secs,
        clean_session: true,
        username: params.config.username.clone(),
        password: params.config.password.clone(),
    });
    write_packet(&mut stream, &connect)?;

    let mut buffer = Vec::new();
    let deadline = Instant::now() + timeout;
    let code = loop {
        if let Some((packet, used)) = Packet::decode(&buffer)? {
            buffer.drain(..used);
            match packet {
                Packet::ConnAck { code, .. } => break code,
                other => {
                    return Err(SignalingError::Protocol(format!(
                        "expected CONNACK, got {:?}",
                        other
                    )));
                }
            }
        }
        if Instant::now() >= deadline {
            return Err(SignalingError::Unreachable(
                "no CONNACK from broker".to_string(),
            ));
        }
        read_some(&mut stream, &mut buffer)?;
    };

    if let Some(err) = code.to_error() {
        return Err(err);
    }
    debug_assert_eq!(code, ConnectReturnCode::Accepted);

    let subscribe = Packet::Subscribe {
        packet_id: state.packet_id(),
        filters: state
            .subscriptions
            .iter()
            .map(|topic| (topic.clone(), QoS::AtLeastOnce))
            .collect(),
    };
    write_packet(&mut stream, &subscribe)?;

    let flushed = state.flush_pending(&mut stream)?;
    if flushed > 0 {
        params
            .logger
            .debug(&format!("Flushed {} queued publish(es)", flushed));
    }

    Ok(stream)
}

fn run_session(
    stream: &mut TcpStream,
    params: &SignalingThreadParams,
    state: &mut IoState,
) -> SessionEnd {
    let keep_alive = params.config.keep_alive();
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut last_sent = Instant::now();
    let mut ping_sent_at: Option<Instant> = None;

    loop {
        // Outbound
        loop {
            match params.outbound.try_recv() {
                Ok(OutboundRequest::Publish { topic, payload }) => {
                    let packet = Packet::Publish(Publish::at_most_once(&topic, payload.clone()));
                    if let Err(e) = write_packet(stream, &packet) {
                        state.queue_publish(topic, payload, &params.logger);
                        return SessionEnd::Dropped(e.to_string());
                    }
                    last_sent = Instant::now();
                }
                Ok(OutboundRequest::Subscribe { topic }) => {
                    if state.add_subscription(topic.clone()) {
                        let packet = Packet::Subscribe {
                            packet_id: state.packet_id(),
                            filters: vec![(topic, QoS::AtLeastOnce)],
                        };
                        if let Err(e) = write_packet(stream, &packet) {
                            return SessionEnd::Dropped(e.to_string());
                        }
                        last_sent = Instant::now();
                    }
                }
                Ok(OutboundRequest::Shutdown) | Err(TryRecvError::Disconnected) => {
                    return SessionEnd::Shutdown;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        // Inbound
        if let Err(e) = read_some(stream, &mut buffer) {
            return SessionEnd::Dropped(e.to_string());
        }
        loop {
            match Packet::decode(&buffer) {
                Ok(Some((packet, used))) => {
                    buffer.drain(..used);
                    match handle_packet(packet, stream, params, state) {
                        Ok(true) => ping_sent_at = None,
                        Ok(false) => {}
                        Err(e) => return SessionEnd::Dropped(e.to_string()),
                    }
                }
                Ok(None) => break,
                Err(e) => return SessionEnd::Dropped(e.to_string()),
            }
        }

        // Keep-alive
        if let Some(period) = keep_alive {
            let now = Instant::now();
            if let Some(sent) = ping_sent_at {
                if now.duration_since(sent) >= period {
                    return SessionEnd::Dropped("keep-alive timeout".to_string());
                }
            } else if now.duration_since(last_sent) >= period / 2 {
                if let Err(e) = write_packet(stream, &Packet::PingReq) {
                    return SessionEnd::Dropped(e.to_string());
                }
                ping_sent_at = Some(now);
                last_sent = now;
            }
        }
    }
}

/// Returns `Ok(true)` when the packet was a PINGRESP.
fn handle_packet(
    packet: Packet,
    stream: &mut TcpStream,
    params: &SignalingThreadParams,
    state: &mut IoState,
) -> Result<bool> {
    match packet {
        Packet::Publish(publish) => {
            if publish.qos != QoS::AtMostOnce
                && let Some(packet_id) = publish.packet_id
            {
                write_packet(stream, &Packet::PubAck { packet_id })?;
            }
            deliver(publish, params, state);
            Ok(false)
        }
        Packet::PingResp => Ok(true),
        Packet::SubAck { return_codes, .. } => {
            if return_codes.contains(&0x80) {
                params.logger.warn("Broker refused a subscription");
            }
            Ok(false)
        }
        Packet::PubAck { .. } => Ok(false),
        Packet::Disconnect => Err(SignalingError::Unreachable(
            "broker sent DISCONNECT".to_string(),
        )),
        other => Err(SignalingError::Protocol(format!(
            "unexpected packet from broker: {:?}",
            other
        ))),
    }
}

fn deliver(publish: Publish, params: &SignalingThreadParams, state: &mut IoState) {
    let own_inbox = inbox_owner(&params.config.topic_prefix, &publish.topic)
        .is_some_and(|owner| owner == params.phone_id);

    let inbound = match SignalingMessage::from_json(&publish.payload) {
        Ok(message) if own_inbox => Inbound::Signaling(message),
        _ => Inbound::Application {
            topic: publish.topic,
            payload: publish.payload,
        },
    };

    state.inbound_count += 1;
    if state.inbound_count.is_multiple_of(100) {
        params
            .logger
            .debug(&format!("{} messages received from broker", state.inbound_count));
    }

    match params.inbox.try_send(inbound) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => params
            .logger
            .warn("Inbound queue full, dropping message"),
        Err(TrySendError::Disconnected(_)) => {}
    }
}

/// Sleeps for `delay` while still accepting requests. Returns true on
/// shutdown.
fn wait_or_shutdown(delay: Duration, params: &SignalingThreadParams, state: &mut IoState) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        match params.outbound.recv_timeout(remaining.min(POLL_INTERVAL)) {
            Ok(OutboundRequest::Publish { topic, payload }) => {
                state.queue_publish(topic, payload, &params.logger);
            }
            Ok(OutboundRequest::Subscribe { topic }) => {
                state.add_subscription(topic);
            }
            Ok(OutboundRequest::Shutdown) | Err(RecvTimeoutError::Disconnected) => return true,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

fn write_packet(stream: &mut impl Write, packet: &Packet) -> Result<()> {
    stream
        .write_all(&packet.encode())
        .map_err(|e| SignalingError::Unreachable(e.to_string()))
}

/// Appends whatever is readable within the socket's read timeout.
fn read_some(stream: &mut TcpStream, buffer: &mut Vec<u8>) -> Result<()> {
    let mut chunk = [0u8; READ_CHUNK];
    match stream.read(&mut chunk) {
        Ok(0) => Err(SignalingError::Unreachable(
            "connection closed by broker".to_string(),
        )),
        Ok(n) => {
            buffer.extend_from_slice(&chunk[..n]);
            Ok(())
        }
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(()),
        Err(e) if e.kind() == ErrorKind::Interrupted => Ok(()),
        Err(e) => Err(SignalingError::Unreachable(e.to_string())),
    }
}
