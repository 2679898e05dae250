#![allow(dead_code)]

use logging::Logger;
use media::video::nal::join_annex_b;
use media::{AnnexBDecoder, DecodedFrame, EncodedUnit, MediaError, RenderSurface, VideoDecoder};
use network::{Channel, ChannelConfig, ChannelTarget};
use p2p_video::config::{NegotiationConfig, PipelineConfig, TransportConfig};
use p2p_video::negotiation::{
    Codec, DecodeMode, DisplayMode, Negotiated, NegotiationContext, NegotiationError,
    NegotiationRequest, Negotiator, PathKind, TransportDescriptor,
};
use p2p_video::session::{DecoderFactory, LoopbackConnector, NegotiatorFactory, SignalingConnector};
use p2p_video::PhoneId;
use p2p_video::{EngineConfig, EngineDeps, EventStream, P2pVideoEngine, SessionEvent, SessionState};
use signaling::{LoopbackBroker, SignalingClient, SignalingConfig, SignalingMessage, TransportHints};
use std::collections::VecDeque;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(5);
pub const FRAME_TICKS: u32 = 3_000;

/// Truncated SPS: recognized as a parameter set, picture size left at the default.
pub const SPS: &[u8] = &[0x67, 0x42, 0x00];
pub const PPS: &[u8] = &[0x68, 0xCE, 0x38, 0x80];
pub const IDR: &[u8] = &[0x65, 0x88, 0x84, 0x00];
pub const P_SLICE: &[u8] = &[0x41, 0x9A, 0x02];

/// Parameter sets plus IDR when `keyframe`, else a single P slice.
pub fn access_unit(keyframe: bool) -> Vec<u8> {
    if keyframe {
        join_annex_b([SPS, PPS, IDR])
    } else {
        join_annex_b([P_SLICE])
    }
}

pub fn loopback_channel_config() -> ChannelConfig {
    ChannelConfig::default().with_bind_address("127.0.0.1:0")
}

pub fn test_config() -> EngineConfig {
    EngineConfig::default()
        .with_negotiation(
            NegotiationConfig::default()
                .with_bind_address("127.0.0.1:0")
                .with_host_address("127.0.0.1")
                .with_timeouts(
                    Duration::from_millis(1_500),
                    Duration::from_millis(500),
                    Duration::from_secs(3),
                ),
        )
        .with_transport(TransportConfig::default().with_channel(loopback_channel_config()))
        .with_pipeline(PipelineConfig::default().with_stall_timeout(Duration::from_secs(10)))
}

/// Records the pts of every presented frame.
#[derive(Clone, Default)]
pub struct RecordingSurface {
    pub presented: Arc<Mutex<Vec<u32>>>,
}

impl RecordingSurface {
    pub fn presented(&self) -> Vec<u32> {
        self.presented.lock().unwrap().clone()
    }

    pub fn frame_indices(&self) -> Vec<u32> {
        self.presented().iter().map(|pts| pts / FRAME_TICKS).collect()
    }

    pub fn wait_for(&self, count: usize) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if self.presented.lock().unwrap().len() >= count {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

impl RenderSurface for RecordingSurface {
    fn present(&mut self, frame: &DecodedFrame) -> media::Result<()> {
        self.presented.lock().unwrap().push(frame.pts);
        Ok(())
    }
}

/// Annex-B decoder that reports a codec error for one timestamp.
pub struct FailingDecoder {
    inner: AnnexBDecoder,
    fail_at: u32,
}

impl VideoDecoder for FailingDecoder {
    fn decode(&mut self, unit: &EncodedUnit) -> media::Result<Option<DecodedFrame>> {
        if unit.timestamp == self.fail_at {
            return Err(MediaError::Codec("injected failure".to_string()));
        }
        self.inner.decode(unit)
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn name(&self) -> &str {
        "H264/failing"
    }
}

pub struct FailingDecoders {
    pub fail_at: u32,
}

impl DecoderFactory for FailingDecoders {
    fn create(
        &self,
        _codec: Codec,
        _config: &PipelineConfig,
        logger: &Logger,
    ) -> media::Result<Box<dyn VideoDecoder>> {
        Ok(Box::new(FailingDecoder {
            inner: AnnexBDecoder::new(logger.clone()),
            fail_at: self.fail_at,
        }))
    }
}

/// Scripted outcome of one negotiation attempt.
#[derive(Clone)]
pub enum Scripted {
    Fail(NegotiationError),
    /// Blocks until the attempt is cancelled.
    Hang,
    Connect,
    /// Connects to a socket that never answers keepalives.
    Silent,
}

/// Negotiates against an in-process peer channel, following a script.
/// Once the script runs out every attempt connects.
#[derive(Clone, Default)]
pub struct FakeNegotiators {
    pub script: Arc<Mutex<VecDeque<Scripted>>>,
    pub attempts: Arc<AtomicUsize>,
    /// Peer ends of connected sessions, kept alive for the test.
    pub peers: Arc<Mutex<Vec<Channel>>>,
    pub silent_peers: Arc<Mutex<Vec<UdpSocket>>>,
}

impl FakeNegotiators {
    pub fn scripted(steps: &[Scripted]) -> Self {
        let negotiators = Self::default();
        negotiators.script.lock().unwrap().extend(steps.iter().cloned());
        negotiators
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn last_peer<R>(&self, f: impl FnOnce(&Channel) -> R) -> Option<R> {
        self.peers.lock().unwrap().last().map(f)
    }
}

impl NegotiatorFactory for FakeNegotiators {
    fn create(&self, _config: &NegotiationConfig, _logger: &Logger) -> Box<dyn Negotiator> {
        Box::new(self.clone())
    }
}

impl Negotiator for FakeNegotiators {
    fn negotiate(
        &mut self,
        request: &NegotiationRequest,
        context: &NegotiationContext<'_>,
    ) -> Result<Negotiated, NegotiationError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Scripted::Connect);
        match step {
            Scripted::Fail(error) => Err(error),
            Scripted::Hang => {
                while !context.cancel.wait(Duration::from_millis(20)) {}
                Err(NegotiationError::Cancelled)
            }
            Scripted::Connect => {
                let local = UdpSocket::bind("127.0.0.1:0")?;
                let peer = UdpSocket::bind("127.0.0.1:0")?;
                let peer_addr = peer.local_addr()?;
                let channel = Channel::open(
                    ChannelTarget::direct(local.local_addr()?),
                    Some(peer),
                    0,
                    &loopback_channel_config(),
                    &Logger::disabled(),
                )
                .map_err(|e| NegotiationError::Io(e.to_string()))?;
                self.peers.lock().unwrap().push(channel);
                Ok(negotiated(request, local, peer_addr))
            }
            Scripted::Silent => {
                let local = UdpSocket::bind("127.0.0.1:0")?;
                let peer = UdpSocket::bind("127.0.0.1:0")?;
                let peer_addr = peer.local_addr()?;
                self.silent_peers.lock().unwrap().push(peer);
                Ok(negotiated(request, local, peer_addr))
            }
        }
    }
}

fn negotiated(request: &NegotiationRequest, local: UdpSocket, peer: SocketAddr) -> Negotiated {
    Negotiated {
        descriptor: TransportDescriptor {
            session_id: request.session_id.clone(),
            path: PathKind::Direct,
            endpoint: peer,
            relay_channel: None,
            codec: Codec::H264,
            display_mode: request.display_mode,
            decode_mode: request.decode_mode,
        },
        socket: Some(local),
    }
}

/// In-memory signaling whose connect takes `delay`.
pub struct SlowConnector {
    pub inner: LoopbackConnector,
    pub delay: Duration,
}

impl SignalingConnector for SlowConnector {
    fn connect(
        &self,
        config: &SignalingConfig,
        phone: &PhoneId,
        logger: &Logger,
    ) -> signaling::Result<SignalingClient> {
        thread::sleep(self.delay);
        self.inner.connect(config, phone, logger)
    }
}

/// An engine on loopback signaling with a recording surface on texture 42.
pub struct Harness {
    pub engine: P2pVideoEngine,
    pub events: EventStream,
    pub brokers: Receiver<LoopbackBroker>,
    pub surface: RecordingSurface,
}

impl Harness {
    pub fn start(config: EngineConfig, customize: impl FnOnce(EngineDeps) -> EngineDeps) -> Self {
        let logger = Logger::disabled();
        let (connector, brokers) = LoopbackConnector::new();
        let deps = customize(EngineDeps::production(&logger).with_signaling(Arc::new(connector)));
        let mut engine = P2pVideoEngine::start(config, deps, &logger).unwrap();
        let events = engine.events().unwrap();
        let surface = RecordingSurface::default();
        engine
            .surfaces()
            .register(42, Box::new(surface.clone()))
            .unwrap();
        Self {
            engine,
            events,
            brokers,
            surface,
        }
    }

    /// `initMqtt("phone1")` and the broker of the new connection.
    pub fn init(&self) -> LoopbackBroker {
        self.engine.init_mqtt("phone1").wait().unwrap();
        self.brokers.recv_timeout(WAIT).unwrap()
    }

    pub fn wait_event(&self, mut matches: impl FnMut(&SessionEvent) -> bool) -> SessionEvent {
        let deadline = Instant::now() + WAIT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) if matches(&event) => return event,
                Ok(_) => continue,
                Err(_) => panic!("timed out waiting for event"),
            }
        }
    }

    pub fn wait_state(&self, state: SessionState) {
        self.wait_event(|event| {
            matches!(event, SessionEvent::StateChanged { state: s, .. } if *s == state)
        });
    }

    /// Waits for `Streaming` and returns its session id.
    pub fn wait_streaming(&self) -> String {
        match self.wait_event(|event| matches!(event, SessionEvent::Streaming { .. })) {
            SessionEvent::Streaming { session_id, .. } => session_id,
            _ => unreachable!(),
        }
    }
}

pub fn start_args() -> (i32, i64, i32) {
    (DisplayMode::Texture.as_i32(), 42, DecodeMode::Balanced.as_i32())
}

/// Remote camera reached over loopback signaling.
///
/// Answers the engine's offer, answers its connectivity probes, then
/// streams `frames` access units (keyframes at `keyframes`) over a
/// transport channel. The join handle yields the channel and broker so
/// the caller keeps them alive.
pub fn spawn_device(
    broker: LoopbackBroker,
    device_id: &str,
    frames: u32,
    keyframes: &[u32],
) -> JoinHandle<(Channel, LoopbackBroker)> {
    let device_id = device_id.to_string();
    let keyframes = keyframes.to_vec();
    thread::spawn(move || {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = socket.local_addr().unwrap().port();

        let session_id = loop {
            let (_, message) = broker.next_signaling(WAIT).expect("no offer published");
            if let SignalingMessage::Offer { session_id, .. } = message {
                break session_id;
            }
        };
        broker
            .deliver(SignalingMessage::Answer {
                session_id,
                from: device_id,
                hints: TransportHints {
                    address: "127.0.0.1".to_string(),
                    port,
                    codecs: vec!["H264".to_string()],
                    ..TransportHints::default()
                },
            })
            .unwrap();

        let engine_addr = answer_first_probe(&socket);
        let channel = Channel::open(
            ChannelTarget::direct(engine_addr),
            Some(socket),
            0,
            &loopback_channel_config(),
            &Logger::disabled(),
        )
        .unwrap();

        // Let the engine bring its pipeline up.
        thread::sleep(Duration::from_millis(300));
        for index in 0..frames {
            let unit = access_unit(keyframes.contains(&index));
            channel.send_unit(&unit, index * FRAME_TICKS).unwrap();
            thread::sleep(Duration::from_millis(10));
        }
        (channel, broker)
    })
}

fn answer_first_probe(socket: &UdpSocket) -> SocketAddr {
    socket
        .set_read_timeout(Some(Duration::from_millis(100)))
        .unwrap();
    let deadline = Instant::now() + WAIT;
    let mut buf = [0u8; 1500];
    while Instant::now() < deadline {
        if let Ok((len, from)) = socket.recv_from(&mut buf)
            && ice::answer_probe(socket, &buf[..len], from)
        {
            socket.set_read_timeout(None).unwrap();
            return from;
        }
    }
    panic!("engine never probed the device");
}
