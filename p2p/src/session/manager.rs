//! Session manager worker
//!
//! Receives commands and internal notifications on one queue and applies
//! them to the session state machine:
//!
//! ```text
//! Idle -> Negotiating -> Connecting -> Streaming -> Closing -> Idle
//!                  \__________\___________\______ Error -> Idle
//! ```

use super::deps::EngineDeps;
use super::ticket::TicketResolver;
use super::workers::{
    AttemptThreadParams, Connected, PumpThreadParams, RelayThreadParams, run_attempt_thread,
    run_pump_thread, run_relay_thread,
};
use super::{SessionCommand, SessionEvent, SessionState};
use crate::cancel::CancelToken;
use crate::config::{DeadPolicy, EngineConfig};
use crate::error::{EngineError, ErrorCode, FailureReport};
use crate::identity::{DeviceId, Identity, PhoneId};
use crate::negotiation::{DecodeMode, DisplayMode, NegotiationRequest, TransportDescriptor};
use crate::pipeline::{DecodePipeline, FailureSink, PipelineError};
use logging::Logger;
use media::SurfaceLease;
use network::{Channel, TransportError};
use signaling::{Inbound, SignalingClient, SignalingMessage, SignalingSender};
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const REPLY_QUEUE: usize = 32;
const FAILURE_SEND_ATTEMPTS: u32 = 20;
const FAILURE_SEND_DELAY: Duration = Duration::from_millis(50);

/// Everything the manager thread receives.
pub(crate) enum ManagerMessage {
    Command(SessionCommand, TicketResolver),
    AttemptFinished {
        attempt_id: u64,
        result: Result<Connected, EngineError>,
    },
    ChannelEnded {
        session_id: String,
        generation: u32,
        /// `None` when the stream ended without a terminal error.
        error: Option<TransportError>,
    },
    PipelineFailed {
        session_id: String,
        error: PipelineError,
    },
    Signaling(Inbound),
    Shutdown,
}

/// Parameters for the session manager thread
pub(crate) struct ManagerThreadParams {
    pub config: EngineConfig,
    pub deps: EngineDeps,
    pub inbox: Receiver<ManagerMessage>,
    pub sender: SyncSender<ManagerMessage>,
    pub events: SyncSender<SessionEvent>,
    pub state: Arc<AtomicU8>,
    pub logger: Logger,
}

struct SignalingLink {
    client: SignalingClient,
    sender: SignalingSender,
    relay: Option<JoinHandle<()>>,
    relay_stop: Arc<AtomicBool>,
}

impl SignalingLink {
    fn close(&mut self, logger: &Logger) {
        self.relay_stop.store(true, Ordering::SeqCst);
        self.client.disconnect();
        if let Some(handle) = self.relay.take()
            && handle.join().is_err()
        {
            logger.error("Signaling relay thread panicked");
        }
    }
}

/// A start command that is negotiating.
struct Attempt {
    id: u64,
    session_id: String,
    device: DeviceId,
    texture_id: i64,
    lease: SurfaceLease,
    cancel: CancelToken,
    replies: SyncSender<SignalingMessage>,
    resolver: Option<TicketResolver>,
}

struct Pump {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

struct ActiveSession {
    session_id: String,
    device: DeviceId,
    descriptor: TransportDescriptor,
    channel: Channel,
    pipeline: DecodePipeline,
    pump: Option<Pump>,
    spare_socket: Option<UdpSocket>,
    reconnects: u32,
}

struct Manager {
    config: EngineConfig,
    deps: EngineDeps,
    sender: SyncSender<ManagerMessage>,
    events: SyncSender<SessionEvent>,
    state_cell: Arc<AtomicU8>,
    logger: Logger,
    state: SessionState,
    identity: Option<Identity>,
    signaling: Option<SignalingLink>,
    attempt: Option<Attempt>,
    session: Option<ActiveSession>,
    next_attempt_id: u64,
}

pub(crate) fn run_manager_thread(params: ManagerThreadParams) {
    params.logger.info("Session manager thread started");
    let mut manager = Manager {
        config: params.config,
        deps: params.deps,
        sender: params.sender,
        events: params.events,
        state_cell: params.state,
        logger: params.logger,
        state: SessionState::Idle,
        identity: None,
        signaling: None,
        attempt: None,
        session: None,
        next_attempt_id: 0,
    };

    for message in params.inbox.iter() {
        match message {
            ManagerMessage::Command(command, resolver) => manager.handle_command(command, resolver),
            ManagerMessage::AttemptFinished { attempt_id, result } => {
                manager.on_attempt_finished(attempt_id, result)
            }
            ManagerMessage::ChannelEnded {
                session_id,
                generation,
                error,
            } => manager.on_channel_ended(&session_id, generation, error),
            ManagerMessage::PipelineFailed { session_id, error } => {
                manager.on_pipeline_failed(&session_id, error)
            }
            ManagerMessage::Signaling(inbound) => manager.on_signaling(inbound),
            ManagerMessage::Shutdown => break,
        }
    }

    manager.shutdown();
    manager.logger.info("Session manager thread stopped");
}

impl Manager {
    fn handle_command(&mut self, command: SessionCommand, resolver: TicketResolver) {
        let name = command.name();
        let fallback = command.fallback_code();
        self.logger.info(&format!("Command {} in state {}", name, self.state));

        let result = match command {
            SessionCommand::Init { phone_id } => self.init(&phone_id),
            SessionCommand::SetPeer { device_id } => self.set_peer(&device_id),
            SessionCommand::Start {
                device_id,
                display_mode,
                texture_id,
                decode_mode,
            } => {
                // Resolved when the attempt finishes.
                match self.start(&device_id, display_mode, texture_id, decode_mode, resolver) {
                    Ok(()) => return,
                    Err((e, resolver)) => {
                        let report = e.report(fallback);
                        self.logger.warn(&format!("{} failed: {}", name, report));
                        resolver.fail(report);
                        return;
                    }
                }
            }
            SessionCommand::Stop => {
                self.stop();
                Ok(())
            }
            SessionCommand::Deinit => self.deinit(),
            SessionCommand::SendJson { json, topic } => self.send_json(&json, &topic),
        };

        match result {
            Ok(()) => resolver.succeed(),
            Err(e) => {
                let report = e.report(fallback);
                self.logger.warn(&format!("{} failed: {}", name, report));
                resolver.fail(report);
            }
        }
    }

    fn init(&mut self, phone_id: &str) -> Result<(), EngineError> {
        let phone = PhoneId::parse(phone_id)?;
        if let Some(identity) = &self.identity
            && self.signaling.is_some()
        {
            if identity.phone == phone {
                self.logger.debug("Signaling already initialized for this identity");
                return Ok(());
            }
            if self.state != SessionState::Idle {
                return Err(EngineError::InvalidState(format!(
                    "cannot switch identity to {} while {}",
                    phone, self.state
                )));
            }
            self.logger.info(&format!("Replacing signaling identity {} with {}", identity.phone, phone));
            self.close_signaling();
        }

        let mut client = self
            .deps
            .signaling
            .connect(&self.config.signaling, &phone, &self.logger)?;
        let messages = client
            .messages()
            .ok_or_else(|| EngineError::InvalidState("signaling inbox already taken".to_string()))?;

        let relay_stop = Arc::new(AtomicBool::new(false));
        let params = RelayThreadParams {
            messages,
            manager: self.sender.clone(),
            stop: Arc::clone(&relay_stop),
            logger: self.logger.for_component("SIGNALING-RELAY"),
        };
        let relay = thread::Builder::new()
            .name("signaling-relay".to_string())
            .spawn(move || run_relay_thread(params))
            .map_err(|e| EngineError::InvalidState(format!("failed to spawn relay thread: {}", e)))?;

        self.signaling = Some(SignalingLink {
            sender: client.sender(),
            client,
            relay: Some(relay),
            relay_stop,
        });
        self.identity = Some(Identity::new(phone));
        self.logger.info("Signaling initialized");
        Ok(())
    }

    fn set_peer(&mut self, device_id: &str) -> Result<(), EngineError> {
        let device = DeviceId::parse(device_id)?;
        let Some(identity) = self.identity.as_ref() else {
            return Err(EngineError::InvalidState("initMqtt has not been called".to_string()));
        };

        match self.state {
            SessionState::Idle | SessionState::Negotiating => {}
            _ if identity.device.as_ref() == Some(&device) => {
                self.logger.debug("Peer already bound to the active session");
                return Ok(());
            }
            _ => {
                self.logger.info(&format!("Peer changed to {}, stopping current session", device));
                self.stop();
            }
        }

        if let Some(identity) = self.identity.as_mut() {
            identity.device = Some(device);
        }
        self.transition(SessionState::Negotiating, None);
        Ok(())
    }

    fn start(
        &mut self,
        device_id: &str,
        display_mode: i32,
        texture_id: i64,
        decode_mode: i32,
        resolver: TicketResolver,
    ) -> Result<(), (EngineError, TicketResolver)> {
        let device = match DeviceId::parse(device_id) {
            Ok(device) => device,
            Err(e) => return Err((e, resolver)),
        };
        let (Some(identity), Some(link)) = (self.identity.as_ref(), self.signaling.as_ref()) else {
            return Err((
                EngineError::InvalidState("initMqtt has not been called".to_string()),
                resolver,
            ));
        };
        let phone = identity.phone.clone();
        let sender = link.sender.clone();

        if self.attempt.is_some() || self.session.is_some() {
            self.logger.info("Start replaces the current session");
            self.stop();
        }

        let lease = match self.deps.surfaces.acquire(texture_id) {
            Ok(lease) => lease,
            Err(e) => return Err((e.into(), resolver)),
        };

        if let Some(identity) = self.identity.as_mut() {
            identity.device = Some(device.clone());
        }
        let session_id = format!("{:016x}", rand::random::<u64>());
        let (replies_tx, replies_rx) = mpsc::sync_channel(REPLY_QUEUE);
        let cancel = CancelToken::new();
        self.next_attempt_id += 1;
        let attempt_id = self.next_attempt_id;

        let params = AttemptThreadParams {
            attempt_id,
            request: NegotiationRequest {
                session_id: session_id.clone(),
                local: phone,
                remote: device.clone(),
                display_mode: DisplayMode::from_i32(display_mode),
                decode_mode: DecodeMode::from_i32(decode_mode),
            },
            negotiation: self.config.negotiation.clone(),
            negotiators: Arc::clone(&self.deps.negotiator),
            channels: Arc::clone(&self.deps.channels),
            channel_config: self.config.transport.channel.clone(),
            sender,
            replies: replies_rx,
            cancel: cancel.clone(),
            manager: self.sender.clone(),
            logger: self.logger.for_component("ATTEMPT"),
        };
        if let Err(e) = thread::Builder::new()
            .name(format!("connect-{}", attempt_id))
            .spawn(move || run_attempt_thread(params))
        {
            return Err((
                EngineError::InvalidState(format!("failed to spawn attempt thread: {}", e)),
                resolver,
            ));
        }

        self.logger.info(&format!(
            "Session {} with {} on texture {} (display {}, decode {})",
            session_id, device, texture_id, display_mode, decode_mode
        ));
        self.attempt = Some(Attempt {
            id: attempt_id,
            session_id: session_id.clone(),
            device,
            texture_id,
            lease,
            cancel,
            replies: replies_tx,
            resolver: Some(resolver),
        });
        self.transition(SessionState::Connecting, Some(session_id));
        Ok(())
    }

    /// Tears down whatever is running and returns to Idle. The render
    /// surface is released when this returns.
    fn stop(&mut self) {
        let session_id = self.current_session_id();
        if self.attempt.is_none() && self.session.is_none() {
            if self.state != SessionState::Idle {
                self.transition(SessionState::Idle, None);
            }
            return;
        }

        self.transition(SessionState::Closing, session_id.clone());
        if let Some(id) = &session_id {
            self.send_bye(id, "stopped");
        }
        self.cancel_attempt(FailureReport::new(ErrorCode::Cancelled, "cancelled by stop"));
        self.teardown_session();
        self.transition(SessionState::Idle, None);
    }

    fn deinit(&mut self) -> Result<(), EngineError> {
        self.stop();
        if self.signaling.is_some() {
            self.close_signaling();
            self.logger.info("Signaling deinitialized");
        }
        self.identity = None;
        Ok(())
    }

    fn send_json(&mut self, json: &str, topic: &str) -> Result<(), EngineError> {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|e| EngineError::InvalidArgument(format!("payload is not JSON: {}", e)))?;
        let link = self
            .signaling
            .as_ref()
            .ok_or_else(|| EngineError::InvalidState("initMqtt has not been called".to_string()))?;

        let topic = if topic.trim().is_empty() {
            let device = self
                .identity
                .as_ref()
                .and_then(|identity| identity.device.as_ref())
                .ok_or_else(|| {
                    EngineError::InvalidArgument("no topic given and no peer bound".to_string())
                })?;
            link.sender.inbox_topic(device.as_str())
        } else {
            topic.to_string()
        };

        link.sender.publish(&topic, json.as_bytes().to_vec())?;
        self.logger.debug(&format!("Published {} bytes to {}", json.len(), topic));
        Ok(())
    }

    fn on_attempt_finished(&mut self, attempt_id: u64, result: Result<Connected, EngineError>) {
        let is_current = self.attempt.as_ref().is_some_and(|a| a.id == attempt_id);
        if !is_current {
            self.logger
                .debug(&format!("Discarding result of stale attempt {}", attempt_id));
            return;
        }
        let Some(mut attempt) = self.attempt.take() else {
            return;
        };
        let resolver = attempt.resolver.take();
        let session_id = attempt.session_id.clone();

        // Either path consumes the attempt, so its lease is gone before the
        // ticket or any event reports the outcome.
        let outcome = match result {
            Ok(connected) => self.begin_streaming(attempt, connected),
            Err(e) => {
                drop(attempt);
                Err(e)
            }
        };
        match outcome {
            Ok(()) => {
                if let Some(resolver) = resolver {
                    resolver.succeed();
                }
            }
            Err(e) => {
                let report = e.report(ErrorCode::P2pVideoError);
                self.logger
                    .warn(&format!("Session {} failed: {}", session_id, report));
                self.transition(SessionState::Error, Some(session_id.clone()));
                self.emit(SessionEvent::Failure {
                    session_id: Some(session_id),
                    report: report.clone(),
                });
                self.transition(SessionState::Idle, None);
                if let Some(resolver) = resolver {
                    resolver.fail(report);
                }
            }
        }
    }

    /// Starts the pipeline on the attempt's surface and the pump for the
    /// first channel generation.
    fn begin_streaming(&mut self, attempt: Attempt, connected: Connected) -> Result<(), EngineError> {
        let Connected {
            descriptor,
            mut channel,
            spare_socket,
        } = connected;

        let decoder = self
            .deps
            .decoders
            .create(descriptor.codec, &self.config.pipeline, &self.logger)?;
        let jitter_depth = descriptor
            .decode_mode
            .jitter_depth(self.config.pipeline.default_jitter_depth);
        let pipeline = DecodePipeline::start(
            decoder,
            attempt.lease,
            jitter_depth,
            &self.config.pipeline,
            self.failure_sink(&attempt.session_id),
            &self.logger,
        )?;
        let pump = spawn_pump(
            &attempt.session_id,
            &mut channel,
            &pipeline,
            &self.sender,
            &self.logger,
        )?;

        self.emit(SessionEvent::Streaming {
            session_id: attempt.session_id.clone(),
            path: descriptor.path,
            endpoint: descriptor.endpoint.to_string(),
            codec: descriptor.codec.to_string(),
            texture_id: attempt.texture_id,
        });
        self.logger.info(&format!(
            "Session {} streaming over {:?} path to {} ({}, jitter depth {})",
            attempt.session_id, descriptor.path, descriptor.endpoint, descriptor.codec, jitter_depth
        ));
        self.session = Some(ActiveSession {
            session_id: attempt.session_id.clone(),
            device: attempt.device,
            descriptor,
            channel,
            pipeline,
            pump: Some(pump),
            spare_socket,
            reconnects: 0,
        });
        self.transition(SessionState::Streaming, Some(attempt.session_id));
        Ok(())
    }

    fn failure_sink(&self, session_id: &str) -> FailureSink {
        let sender = self.sender.clone();
        let session_id = session_id.to_string();
        let logger = self.logger.clone();
        Box::new(move |error| {
            let mut message = ManagerMessage::PipelineFailed {
                session_id: session_id.clone(),
                error,
            };
            for _ in 0..FAILURE_SEND_ATTEMPTS {
                match sender.try_send(message) {
                    Ok(()) => return,
                    Err(TrySendError::Full(returned)) => {
                        message = returned;
                        thread::sleep(FAILURE_SEND_DELAY);
                    }
                    Err(TrySendError::Disconnected(_)) => return,
                }
            }
            logger.error("Manager queue full, pipeline failure not reported");
        })
    }

    fn on_channel_ended(&mut self, session_id: &str, generation: u32, error: Option<TransportError>) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.session_id != session_id || session.channel.generation() != generation {
            self.logger.debug(&format!(
                "Ignoring end of stale channel {} gen {}",
                session_id, generation
            ));
            return;
        }

        let transport = &self.config.transport;
        match error {
            Some(TransportError::Dead { .. })
                if transport.dead_policy == DeadPolicy::Reconnect
                    && session.reconnects < transport.max_reconnects =>
            {
                if let Err(e) = self.reconnect() {
                    self.fail_session(e);
                }
            }
            Some(TransportError::RemoteBye) => self.fail_session(EngineError::PeerClosed(
                "peer closed the media channel".to_string(),
            )),
            Some(e) => self.fail_session(e.into()),
            None => self.fail_session(TransportError::Closed.into()),
        }
    }

    /// Replaces a dead channel with the next generation on the same path.
    fn reconnect(&mut self) -> Result<(), EngineError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let old_generation = session.channel.generation();
        self.logger.warn(&format!(
            "Channel generation {} of session {} is dead, reconnecting ({}/{})",
            old_generation,
            session.session_id,
            session.reconnects + 1,
            self.config.transport.max_reconnects
        ));

        if let Some(pump) = &session.pump {
            pump.stop.store(true, Ordering::SeqCst);
        }
        session.channel.close();
        if let Some(pump) = session.pump.take()
            && pump.handle.join().is_err()
        {
            self.logger.error("Pump thread panicked");
        }

        session.reconnects += 1;
        let generation = old_generation + 1;
        let socket = session
            .spare_socket
            .as_ref()
            .and_then(|socket| socket.try_clone().ok());
        let mut channel = self.deps.channels.open(
            session.descriptor.channel_target(),
            socket,
            generation,
            &self.config.transport.channel,
            &self.logger,
        )?;
        let pump = spawn_pump(
            &session.session_id,
            &mut channel,
            &session.pipeline,
            &self.sender,
            &self.logger,
        )?;
        session.channel = channel;
        session.pump = Some(pump);

        let event = SessionEvent::TransportReconnected {
            session_id: session.session_id.clone(),
            generation,
        };
        self.emit(event);
        Ok(())
    }

    fn on_pipeline_failed(&mut self, session_id: &str, error: PipelineError) {
        if self
            .session
            .as_ref()
            .is_some_and(|session| session.session_id == session_id)
        {
            self.fail_session(error.into());
        }
    }

    fn on_signaling(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Application { topic, payload } => {
                self.emit(SessionEvent::ApplicationMessage {
                    topic,
                    payload: String::from_utf8_lossy(&payload).into_owned(),
                });
            }
            Inbound::Signaling(message) => self.route_signaling(message),
        }
    }

    fn route_signaling(&mut self, message: SignalingMessage) {
        if let Some(attempt) = &self.attempt
            && attempt.session_id == message.session_id()
            && attempt.device.as_str() == message.sender()
        {
            if attempt.replies.try_send(message).is_err() {
                self.logger.warn("Negotiation reply queue full, message dropped");
            }
            return;
        }

        if let SignalingMessage::Bye {
            session_id, reason, ..
        } = &message
            && self
                .session
                .as_ref()
                .is_some_and(|session| &session.session_id == session_id)
        {
            let reason = reason.clone().unwrap_or_else(|| "bye".to_string());
            self.logger.info(&format!("Peer ended session {}: {}", session_id, reason));
            self.fail_session(EngineError::PeerClosed(reason));
            return;
        }

        self.logger.debug(&format!(
            "Ignoring {} for session {} from {}",
            message.kind(),
            message.session_id(),
            message.sender()
        ));
    }

    /// Reports a fatal session error and returns to Idle.
    fn fail_session(&mut self, error: EngineError) {
        let session_id = self.current_session_id();
        let report = error.report(ErrorCode::P2pVideoError);
        self.logger.error(&format!(
            "Session {} failed: {}",
            session_id.as_deref().unwrap_or("-"),
            report
        ));

        // Surface is free before anyone hears about the failure.
        let resolver = self.release_attempt();
        self.teardown_session();

        self.transition(SessionState::Error, session_id.clone());
        self.emit(SessionEvent::Failure {
            session_id,
            report: report.clone(),
        });
        self.transition(SessionState::Idle, None);
        if let Some(resolver) = resolver {
            resolver.fail(report);
        }
    }

    fn cancel_attempt(&mut self, report: FailureReport) {
        if let Some(resolver) = self.release_attempt() {
            resolver.fail(report);
        }
    }

    /// Cancels the running attempt and drops its surface lease. Returns the
    /// start ticket, still unresolved.
    fn release_attempt(&mut self) -> Option<TicketResolver> {
        let mut attempt = self.attempt.take()?;
        attempt.cancel.cancel();
        let resolver = attempt.resolver.take();
        let message = format!(
            "Cancelled attempt {} (session {}), texture {} released",
            attempt.id, attempt.session_id, attempt.texture_id
        );
        drop(attempt);
        self.logger.info(&message);
        resolver
    }

    /// Stops pump, channel and pipeline, in that order. The surface lease
    /// is released once the pipeline has shut down.
    fn teardown_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if let Some(pump) = &session.pump {
            pump.stop.store(true, Ordering::SeqCst);
        }
        session.channel.close();
        session.pipeline.shutdown();
        if let Some(pump) = session.pump.take()
            && pump.handle.join().is_err()
        {
            self.logger.error("Pump thread panicked");
        }

        let stats = session.channel.stats();
        self.logger.info(&format!(
            "Session {} torn down (texture {}, {} packets received, {} lost, {} retransmitted)",
            session.session_id,
            session.pipeline.texture_id(),
            stats.packets_received,
            stats.lost,
            stats.retransmits_received
        ));
    }

    fn close_signaling(&mut self) {
        if let Some(mut link) = self.signaling.take() {
            link.close(&self.logger);
        }
    }

    /// Best-effort bye to the peer of `session_id`.
    fn send_bye(&self, session_id: &str, reason: &str) {
        let device = self
            .session
            .as_ref()
            .filter(|session| session.session_id == session_id)
            .map(|session| &session.device)
            .or_else(|| {
                self.attempt
                    .as_ref()
                    .filter(|attempt| attempt.session_id == session_id)
                    .map(|attempt| &attempt.device)
            });
        let (Some(device), Some(link)) = (device, self.signaling.as_ref()) else {
            return;
        };
        let bye = SignalingMessage::Bye {
            session_id: session_id.to_string(),
            from: link.sender.phone_id().to_string(),
            reason: Some(reason.to_string()),
        };
        if let Err(e) = link.sender.send(device.as_str(), &bye) {
            self.logger.debug(&format!("Could not send bye: {}", e));
        }
    }

    fn current_session_id(&self) -> Option<String> {
        self.session
            .as_ref()
            .map(|session| session.session_id.clone())
            .or_else(|| self.attempt.as_ref().map(|attempt| attempt.session_id.clone()))
    }

    fn transition(&mut self, state: SessionState, session_id: Option<String>) {
        if self.state == state {
            return;
        }
        self.logger
            .info(&format!("State {} -> {}", self.state, state));
        self.state = state;
        state.store(&self.state_cell);
        self.emit(SessionEvent::StateChanged { state, session_id });
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.try_send(event).is_err() {
            self.logger.debug("Event queue full or closed, event dropped");
        }
    }

    fn shutdown(&mut self) {
        self.stop();
        self.close_signaling();
        self.identity = None;
    }
}

fn spawn_pump(
    session_id: &str,
    channel: &mut Channel,
    pipeline: &DecodePipeline,
    manager: &SyncSender<ManagerMessage>,
    logger: &Logger,
) -> Result<Pump, EngineError> {
    let packets = channel.packets().ok_or(TransportError::Closed)?;
    let intake = pipeline.intake().ok_or(PipelineError::Closed)?;
    let stop = Arc::new(AtomicBool::new(false));
    let generation = packets.generation();

    let params = PumpThreadParams {
        session_id: session_id.to_string(),
        packets,
        intake,
        manager: manager.clone(),
        stop: Arc::clone(&stop),
        logger: logger.for_component("PUMP"),
    };
    let handle = thread::Builder::new()
        .name(format!("pump-gen{}", generation))
        .spawn(move || run_pump_thread(params))
        .map_err(|e| TransportError::Io(format!("failed to spawn pump thread: {}", e)))?;
    Ok(Pump { handle, stop })
}
