//! Helper threads of the session manager
//!
//! - the signaling relay forwards inbound broker messages to the manager;
//! - an attempt thread negotiates one session and opens its first channel;
//! - the pump moves packets from a channel generation into the pipeline.
//!
//! Relay and pump are joined by the manager, so they never block on a full
//! manager queue once asked to stop.

use super::deps::{ChannelOpener, NegotiatorFactory};
use super::manager::ManagerMessage;
use crate::cancel::CancelToken;
use crate::config::NegotiationConfig;
use crate::error::EngineError;
use crate::negotiation::{
    NegotiationContext, NegotiationError, NegotiationRequest, TransportDescriptor,
    negotiate_with_retry,
};
use crate::pipeline::PipelineIntake;
use logging::Logger;
use network::{Channel, ChannelConfig, PacketStream};
use signaling::{MessageStream, SignalingMessage, SignalingSender};
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const RETRY_DELAY: Duration = Duration::from_millis(10);

/// Queues `message` for the manager, giving up once `stop` is raised.
///
/// # Returns
///
/// Whether the message was delivered.
pub(crate) fn send_until_stopped(
    sender: &SyncSender<ManagerMessage>,
    mut message: ManagerMessage,
    stop: &AtomicBool,
) -> bool {
    loop {
        match sender.try_send(message) {
            Ok(()) => return true,
            Err(TrySendError::Full(returned)) => {
                if stop.load(Ordering::SeqCst) {
                    return false;
                }
                message = returned;
                thread::sleep(RETRY_DELAY);
            }
            Err(TrySendError::Disconnected(_)) => return false,
        }
    }
}

/// Parameters for the signaling relay thread
pub(crate) struct RelayThreadParams {
    pub messages: MessageStream,
    pub manager: SyncSender<ManagerMessage>,
    pub stop: Arc<AtomicBool>,
    pub logger: Logger,
}

pub(crate) fn run_relay_thread(params: RelayThreadParams) {
    params.logger.info("Signaling relay thread started");
    let mut relayed: u64 = 0;

    while !params.stop.load(Ordering::SeqCst) {
        match params.messages.recv_timeout(POLL_INTERVAL) {
            Ok(inbound) => {
                if !send_until_stopped(&params.manager, ManagerMessage::Signaling(inbound), &params.stop) {
                    break;
                }
                relayed += 1;
                if relayed.is_multiple_of(100) {
                    params.logger.debug(&format!("Relayed {} signaling messages", relayed));
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                params.logger.warn("Signaling inbox closed");
                break;
            }
        }
    }

    params.logger.info("Signaling relay thread stopped");
}

/// A negotiated session with its first channel open.
pub(crate) struct Connected {
    pub descriptor: TransportDescriptor,
    pub channel: Channel,
    /// Clone of the negotiated socket for reopening later generations on
    /// the same local port.
    pub spare_socket: Option<UdpSocket>,
}

impl std::fmt::Debug for Connected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connected")
            .field("descriptor", &self.descriptor)
            .field("generation", &self.channel.generation())
            .finish()
    }
}

/// Parameters for a connection attempt thread
pub(crate) struct AttemptThreadParams {
    pub attempt_id: u64,
    pub request: NegotiationRequest,
    pub negotiation: NegotiationConfig,
    pub negotiators: Arc<dyn NegotiatorFactory>,
    pub channels: Arc<dyn ChannelOpener>,
    pub channel_config: ChannelConfig,
    pub sender: SignalingSender,
    pub replies: Receiver<SignalingMessage>,
    pub cancel: CancelToken,
    pub manager: SyncSender<ManagerMessage>,
    pub logger: Logger,
}

pub(crate) fn run_attempt_thread(params: AttemptThreadParams) {
    let logger = &params.logger;
    logger.info(&format!(
        "Connection attempt {} for session {} started",
        params.attempt_id, params.request.session_id
    ));

    let result = connect(&params);
    match &result {
        Ok(connected) => logger.info(&format!(
            "Attempt {} connected: {:?} path to {}",
            params.attempt_id, connected.descriptor.path, connected.descriptor.endpoint
        )),
        Err(e) => logger.warn(&format!("Attempt {} failed: {}", params.attempt_id, e)),
    }

    // A stale or undeliverable result closes its channel on drop.
    let _ = params.manager.send(ManagerMessage::AttemptFinished {
        attempt_id: params.attempt_id,
        result,
    });
}

fn connect(params: &AttemptThreadParams) -> Result<Connected, EngineError> {
    let mut negotiator = params.negotiators.create(&params.negotiation, &params.logger);
    let context = NegotiationContext {
        sender: &params.sender,
        replies: &params.replies,
        cancel: &params.cancel,
    };

    let negotiated = negotiate_with_retry(
        params.negotiation.max_retries,
        &params.cancel,
        &params.logger,
        |_| negotiator.negotiate(&params.request, &context),
    )?;
    if params.cancel.is_cancelled() {
        return Err(NegotiationError::Cancelled.into());
    }

    let spare_socket = negotiated
        .socket
        .as_ref()
        .and_then(|socket| socket.try_clone().ok());
    let channel = params.channels.open(
        negotiated.descriptor.channel_target(),
        negotiated.socket,
        0,
        &params.channel_config,
        &params.logger,
    )?;

    Ok(Connected {
        descriptor: negotiated.descriptor,
        channel,
        spare_socket,
    })
}

/// Parameters for the channel-to-pipeline pump thread
pub(crate) struct PumpThreadParams {
    pub session_id: String,
    pub packets: PacketStream,
    pub intake: PipelineIntake,
    pub manager: SyncSender<ManagerMessage>,
    pub stop: Arc<AtomicBool>,
    pub logger: Logger,
}

pub(crate) fn run_pump_thread(params: PumpThreadParams) {
    let generation = params.packets.generation();
    params
        .logger
        .info(&format!("Pump thread started for generation {}", generation));
    let mut pumped: u64 = 0;

    let ended = loop {
        if params.stop.load(Ordering::SeqCst) {
            break None;
        }
        match params.packets.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(packet)) => {
                if params.intake.feed(packet).is_err() {
                    params.logger.debug("Pipeline closed, pump exiting");
                    break None;
                }
                pumped += 1;
                if pumped.is_multiple_of(1000) {
                    params
                        .logger
                        .debug(&format!("Pumped {} packets (generation {})", pumped, generation));
                }
            }
            Ok(Err(error)) => break Some(Some(error)),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break Some(None),
        }
    };

    if let Some(error) = ended {
        let message = ManagerMessage::ChannelEnded {
            session_id: params.session_id.clone(),
            generation,
            error,
        };
        send_until_stopped(&params.manager, message, &params.stop);
    }
    params.logger.info(&format!(
        "Pump thread stopped for generation {} after {} packets",
        generation, pumped
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    #[test]
    fn test_send_until_stopped_gives_up_when_full_and_stopped() {
        let (sender, receiver) = sync_channel(1);
        let stop = AtomicBool::new(false);
        assert!(send_until_stopped(&sender, ManagerMessage::Shutdown, &stop));

        stop.store(true, Ordering::SeqCst);
        assert!(!send_until_stopped(&sender, ManagerMessage::Shutdown, &stop));
        assert!(matches!(receiver.try_recv(), Ok(ManagerMessage::Shutdown)));
    }

    #[test]
    fn test_send_until_stopped_waits_for_room() {
        let (sender, receiver) = sync_channel(1);
        let stop = AtomicBool::new(false);
        sender.try_send(ManagerMessage::Shutdown).unwrap();

        let drainer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            let mut count = 0;
            while receiver.recv_timeout(Duration::from_millis(200)).is_ok() {
                count += 1;
            }
            count
        });
        assert!(send_until_stopped(&sender, ManagerMessage::Shutdown, &stop));
        drop(sender);
        assert_eq!(drainer.join().unwrap(), 2);
    }
}
