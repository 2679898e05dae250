//! Injected dependencies of the session manager
//!
//! Each seam has a production implementation; tests swap in loopback or
//! scripted ones.

use crate::config::{NegotiationConfig, PipelineConfig};
use crate::identity::PhoneId;
use crate::negotiation::{Codec, Negotiator, SignalingNegotiator};
use logging::Logger;
use media::{AnnexBDecoder, MediaError, SurfaceRegistry, VideoDecoder};
use network::{Channel, ChannelConfig, ChannelTarget};
use signaling::{LoopbackBroker, SignalingClient, SignalingConfig};
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, SyncSender};

/// Opens the signaling connection for a phone identity.
pub trait SignalingConnector: Send + Sync {
    fn connect(
        &self,
        config: &SignalingConfig,
        phone: &PhoneId,
        logger: &Logger,
    ) -> signaling::Result<SignalingClient>;
}

/// MQTT over TCP to the configured broker.
pub struct MqttConnector;

impl SignalingConnector for MqttConnector {
    fn connect(
        &self,
        config: &SignalingConfig,
        phone: &PhoneId,
        logger: &Logger,
    ) -> signaling::Result<SignalingClient> {
        SignalingClient::connect(config, phone.as_str(), logger)
    }
}

/// In-process broker; each connection's [`LoopbackBroker`] is handed out
/// on the receiver returned by [`LoopbackConnector::new`].
pub struct LoopbackConnector {
    brokers: SyncSender<LoopbackBroker>,
}

impl LoopbackConnector {
    pub fn new() -> (Self, Receiver<LoopbackBroker>) {
        let (brokers, receiver) = mpsc::sync_channel(16);
        (Self { brokers }, receiver)
    }
}

impl SignalingConnector for LoopbackConnector {
    fn connect(
        &self,
        config: &SignalingConfig,
        phone: &PhoneId,
        logger: &Logger,
    ) -> signaling::Result<SignalingClient> {
        let (client, broker) = SignalingClient::in_memory(phone.as_str(), &config.topic_prefix);
        if self.brokers.try_send(broker).is_err() {
            logger.warn("Loopback broker handle not collected");
        }
        Ok(client)
    }
}

/// Creates one negotiator per connection attempt.
pub trait NegotiatorFactory: Send + Sync {
    fn create(&self, config: &NegotiationConfig, logger: &Logger) -> Box<dyn Negotiator>;
}

pub struct SignalingNegotiatorFactory;

impl NegotiatorFactory for SignalingNegotiatorFactory {
    fn create(&self, config: &NegotiationConfig, logger: &Logger) -> Box<dyn Negotiator> {
        Box::new(SignalingNegotiator::new(config.clone(), logger))
    }
}

/// Opens transport channels, one per generation.
pub trait ChannelOpener: Send + Sync {
    fn open(
        &self,
        target: ChannelTarget,
        socket: Option<UdpSocket>,
        generation: u32,
        config: &ChannelConfig,
        logger: &Logger,
    ) -> network::Result<Channel>;
}

pub struct UdpChannelOpener;

impl ChannelOpener for UdpChannelOpener {
    fn open(
        &self,
        target: ChannelTarget,
        socket: Option<UdpSocket>,
        generation: u32,
        config: &ChannelConfig,
        logger: &Logger,
    ) -> network::Result<Channel> {
        Channel::open(target, socket, generation, config, logger)
    }
}

/// Picks the decoder for a negotiated codec.
pub trait DecoderFactory: Send + Sync {
    fn create(
        &self,
        codec: Codec,
        config: &PipelineConfig,
        logger: &Logger,
    ) -> media::Result<Box<dyn VideoDecoder>>;
}

/// Annex-B pass-through for the surface's hardware decoder, or FFmpeg
/// when `software_decode` is set and the `ffmpeg` feature is built.
pub struct DefaultDecoderFactory;

impl DecoderFactory for DefaultDecoderFactory {
    fn create(
        &self,
        codec: Codec,
        config: &PipelineConfig,
        logger: &Logger,
    ) -> media::Result<Box<dyn VideoDecoder>> {
        if codec != Codec::H264 {
            return Err(MediaError::Codec(format!("no decoder for {}", codec)));
        }
        let logger = logger.for_component("DECODER");
        if config.software_decode {
            return software_decoder(logger);
        }
        Ok(Box::new(AnnexBDecoder::new(logger)))
    }
}

#[cfg(feature = "ffmpeg")]
fn software_decoder(logger: Logger) -> media::Result<Box<dyn VideoDecoder>> {
    Ok(Box::new(media::FfmpegH264Decoder::new(logger)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn software_decoder(_logger: Logger) -> media::Result<Box<dyn VideoDecoder>> {
    Err(MediaError::Codec(
        "software decoding needs the ffmpeg feature".to_string(),
    ))
}

/// Everything the manager needs from the outside world.
#[derive(Clone)]
pub struct EngineDeps {
    pub signaling: Arc<dyn SignalingConnector>,
    pub negotiator: Arc<dyn NegotiatorFactory>,
    pub channels: Arc<dyn ChannelOpener>,
    pub decoders: Arc<dyn DecoderFactory>,
    pub surfaces: SurfaceRegistry,
}

impl EngineDeps {
    /// MQTT signaling, UDP negotiation and transport, default decoders.
    pub fn production(logger: &Logger) -> Self {
        Self {
            signaling: Arc::new(MqttConnector),
            negotiator: Arc::new(SignalingNegotiatorFactory),
            channels: Arc::new(UdpChannelOpener),
            decoders: Arc::new(DefaultDecoderFactory),
            surfaces: SurfaceRegistry::new(logger.for_component("SURFACE")),
        }
    }

    pub fn with_signaling(mut self, connector: Arc<dyn SignalingConnector>) -> Self {
        self.signaling = connector;
        self
    }

    pub fn with_negotiator(mut self, factory: Arc<dyn NegotiatorFactory>) -> Self {
        self.negotiator = factory;
        self
    }

    pub fn with_channel_opener(mut self, opener: Arc<dyn ChannelOpener>) -> Self {
        self.channels = opener;
        self
    }

    pub fn with_decoders(mut self, factory: Arc<dyn DecoderFactory>) -> Self {
        self.decoders = factory;
        self
    }

    pub fn with_surfaces(mut self, surfaces: SurfaceRegistry) -> Self {
        self.surfaces = surfaces;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_decoder_factory() {
        let factory = DefaultDecoderFactory;
        let config = PipelineConfig::default();
        let decoder = factory.create(Codec::H264, &config, &Logger::disabled()).unwrap();
        assert_eq!(decoder.name(), "H264/AnnexB");
        assert!(factory.create(Codec::Mjpeg, &config, &Logger::disabled()).is_err());
    }

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn test_software_decode_needs_feature() {
        let config = PipelineConfig {
            software_decode: true,
            ..PipelineConfig::default()
        };
        assert!(DefaultDecoderFactory.create(Codec::H264, &config, &Logger::disabled()).is_err());
    }

    #[test]
    fn test_loopback_connector_hands_out_broker() {
        let (connector, brokers) = LoopbackConnector::new();
        let phone = PhoneId::parse("phone1").unwrap();
        let client = connector
            .connect(&SignalingConfig::default(), &phone, &Logger::disabled())
            .unwrap();
        assert_eq!(client.phone_id(), "phone1");
        let broker = brokers.try_recv().unwrap();
        assert_eq!(
            broker.phone_inbox(),
            signaling::inbox_topic(&SignalingConfig::default().topic_prefix, "phone1")
        );
    }
}
