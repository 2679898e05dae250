//! UI bridge
//!
//! [`P2pVideoEngine`] is the object the platform layer holds. Each UI
//! operation is queued for the session manager and answered with a
//! [`CommandTicket`]; nothing here blocks on the network.

use crate::config::EngineConfig;
use crate::error::{EngineError, ErrorCode, FailureReport, Result};
use crate::session::{
    CommandTicket, EngineDeps, ManagerMessage, ManagerThreadParams, SessionCommand, SessionEvent,
    SessionState, run_manager_thread,
};
use logging::Logger;
use media::SurfaceRegistry;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicU8;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Session events, in the order the manager produced them.
pub struct EventStream {
    receiver: Receiver<SessionEvent>,
}

impl EventStream {
    pub fn recv_timeout(&self, timeout: Duration) -> std::result::Result<SessionEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn try_next(&self) -> std::result::Result<SessionEvent, TryRecvError> {
        self.receiver.try_recv()
    }
}

impl Iterator for EventStream {
    type Item = SessionEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

pub struct P2pVideoEngine {
    commands: SyncSender<ManagerMessage>,
    events: Option<Receiver<SessionEvent>>,
    state: Arc<AtomicU8>,
    surfaces: SurfaceRegistry,
    handle: Option<JoinHandle<()>>,
    logger: Logger,
}

impl P2pVideoEngine {
    /// Starts the session manager.
    ///
    /// # Arguments
    ///
    /// * `config` - Engine configuration
    /// * `deps` - Signaling, negotiation, transport and decoder seams plus
    ///   the render-surface registry the platform view layer registers into
    /// * `logger` - Root logger; components derive their own from it
    ///
    /// # Errors
    ///
    /// `InvalidState` if the manager thread cannot be spawned.
    pub fn start(config: EngineConfig, deps: EngineDeps, logger: &Logger) -> Result<Self> {
        let logger = logger.for_component("ENGINE");
        let (commands_tx, commands_rx) = mpsc::sync_channel(config.command_queue_capacity.max(1));
        let (events_tx, events_rx) = mpsc::sync_channel(config.event_queue_capacity.max(1));
        let state = Arc::new(AtomicU8::new(SessionState::Idle as u8));
        let surfaces = deps.surfaces.clone();

        let params = ManagerThreadParams {
            config,
            deps,
            inbox: commands_rx,
            sender: commands_tx.clone(),
            events: events_tx,
            state: Arc::clone(&state),
            logger: logger.for_component("SESSION"),
        };
        let handle = thread::Builder::new()
            .name("session-manager".to_string())
            .spawn(move || run_manager_thread(params))
            .map_err(|e| EngineError::InvalidState(format!("failed to spawn session manager: {}", e)))?;

        logger.info("Engine started");
        Ok(Self {
            commands: commands_tx,
            events: Some(events_rx),
            state,
            surfaces,
            handle: Some(handle),
            logger,
        })
    }

    /// Loads the configuration, builds the root logger it describes and
    /// starts the engine with production dependencies.
    pub fn from_config_file(path: Option<&Path>) -> Result<Self> {
        let config = EngineConfig::load(path)?;
        let logger = config
            .logging
            .build_logger()
            .map_err(|e| EngineError::Config(format!("cannot open log file: {}", e)))?;
        let deps = EngineDeps::production(&logger);
        Self::start(config, deps, &logger)
    }

    /// `initMqtt`: connects signaling as `phone_id`. Idempotent.
    pub fn init_mqtt(&self, phone_id: &str) -> CommandTicket {
        self.submit(SessionCommand::Init {
            phone_id: phone_id.to_string(),
        })
    }

    /// `setDevP2p`: binds the peer for the next start.
    pub fn set_dev_p2p(&self, device_id: &str) -> CommandTicket {
        self.submit(SessionCommand::SetPeer {
            device_id: device_id.to_string(),
        })
    }

    /// `startP2pVideo`: streams `device_id` onto the surface registered as
    /// `texture_id`. The ticket resolves once streaming or failed.
    pub fn start_p2p_video(
        &self,
        device_id: &str,
        display_mode: i32,
        texture_id: i64,
        decode_mode: i32,
    ) -> CommandTicket {
        self.submit(SessionCommand::Start {
            device_id: device_id.to_string(),
            display_mode,
            texture_id,
            decode_mode,
        })
    }

    /// `stopP2pVideo`: idempotent teardown. The surface is unbound when the
    /// ticket resolves.
    pub fn stop_p2p_video(&self) -> CommandTicket {
        self.submit(SessionCommand::Stop)
    }

    /// `deinitMqtt`: stops any session and disconnects signaling.
    pub fn deinit_mqtt(&self) -> CommandTicket {
        self.submit(SessionCommand::Deinit)
    }

    /// `sendJsonMsg`: publishes `json` on `topic`, or to the bound peer
    /// when `topic` is empty.
    pub fn send_json_msg(&self, json: &str, topic: &str) -> CommandTicket {
        self.submit(SessionCommand::SendJson {
            json: json.to_string(),
            topic: topic.to_string(),
        })
    }

    /// Queues `command` without blocking.
    pub fn submit(&self, command: SessionCommand) -> CommandTicket {
        let (ticket, resolver) = CommandTicket::pair();
        match self.commands.try_send(ManagerMessage::Command(command, resolver)) {
            Ok(()) => ticket,
            Err(TrySendError::Full(ManagerMessage::Command(command, resolver))) => {
                self.logger
                    .warn(&format!("Command queue full, rejecting {}", command.name()));
                resolver.fail(FailureReport::new(
                    ErrorCode::EngineBusy,
                    format!("command queue full, {} rejected", command.name()),
                ));
                ticket
            }
            Err(_) => CommandTicket::resolved(Err(EngineError::ShutDown.report(ErrorCode::InvalidState))),
        }
    }

    /// Takes the event stream. Only the first call returns it.
    pub fn events(&mut self) -> Option<EventStream> {
        self.events.take().map(|receiver| EventStream { receiver })
    }

    /// Registry the platform view layer registers render surfaces into.
    pub fn surfaces(&self) -> &SurfaceRegistry {
        &self.surfaces
    }

    /// Last state published by the manager.
    pub fn state(&self) -> SessionState {
        SessionState::load(&self.state)
    }

    /// Stops any session, disconnects signaling and joins the manager.
    /// Idempotent.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        // Blocking send: the manager drains its queue continuously.
        let _ = self.commands.send(ManagerMessage::Shutdown);
        if handle.join().is_err() {
            self.logger.error("Session manager thread panicked");
        }
        self.logger.info("Engine shut down");
    }
}

impl Drop for P2pVideoEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
