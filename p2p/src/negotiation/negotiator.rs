//! Offer/answer exchange over signaling

use super::codec::{Codec, select_codec};
use super::descriptor::{DecodeMode, DisplayMode, TransportDescriptor};
use super::path::{UdpProber, negotiate_path};
use super::{NegotiationError, Result};
use crate::cancel::CancelToken;
use crate::config::NegotiationConfig;
use crate::identity::{DeviceId, PhoneId};
use ice::{Candidate, CandidateType, GatherOptions, gather_candidates};
use logging::Logger;
use signaling::{Protocol, SignalingMessage, SignalingSender, TransportHints};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

const REPLY_POLL: Duration = Duration::from_millis(50);

/// One session the manager wants negotiated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationRequest {
    pub session_id: String,
    pub local: PhoneId,
    pub remote: DeviceId,
    pub display_mode: DisplayMode,
    pub decode_mode: DecodeMode,
}

/// What a negotiator may use while it runs.
///
/// `replies` carries the answer and candidate messages the manager routed
/// to this session.
pub struct NegotiationContext<'a> {
    pub sender: &'a SignalingSender,
    pub replies: &'a Receiver<SignalingMessage>,
    pub cancel: &'a CancelToken,
}

/// Successful negotiation.
#[derive(Debug)]
pub struct Negotiated {
    pub descriptor: TransportDescriptor,
    /// Socket the path was proven on; `None` lets the channel bind its own.
    pub socket: Option<UdpSocket>,
}

pub trait Negotiator: Send {
    /// Runs one attempt. The caller owns retries.
    fn negotiate(
        &mut self,
        request: &NegotiationRequest,
        context: &NegotiationContext<'_>,
    ) -> Result<Negotiated>;
}

/// The real exchange: gather candidates, offer, wait for the answer, pick
/// a codec and prove a path.
pub struct SignalingNegotiator {
    config: NegotiationConfig,
    logger: Logger,
}

impl SignalingNegotiator {
    pub fn new(config: NegotiationConfig, logger: &Logger) -> Self {
        Self {
            config,
            logger: logger.for_component("NEGOTIATION"),
        }
    }

    fn local_hints(&self, socket: &UdpSocket, request: &NegotiationRequest) -> Result<TransportHints> {
        let options = GatherOptions {
            stun_servers: self.config.stun_servers.clone(),
            stun_timeout: self.config.stun_timeout(),
            host_address: self.config.host_ip(),
        };
        let candidates = gather_candidates(socket, &options, &self.logger);
        let advertised = match candidates.first() {
            Some(best) => best.socket_addr(),
            None => socket.local_addr()?,
        };

        Ok(TransportHints {
            address: advertised.ip().to_string(),
            port: advertised.port(),
            protocols: vec![Protocol::Udp],
            codecs: self.config.codecs.clone(),
            candidates: candidates.iter().map(Candidate::to_sdp_value).collect(),
            relay_channel: None,
            display_mode: Some(request.display_mode.as_i32()),
            decode_mode: Some(request.decode_mode.as_i32()),
        })
    }

    /// Waits for the answer, collecting candidates trickled before and
    /// right after it.
    fn await_answer(
        &self,
        request: &NegotiationRequest,
        context: &NegotiationContext<'_>,
    ) -> Result<(TransportHints, Vec<String>)> {
        let timeout = self.config.answer_timeout();
        let deadline = Instant::now() + timeout;
        let mut trickled = Vec::new();

        let answer = loop {
            if context.cancel.is_cancelled() {
                return Err(NegotiationError::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(NegotiationError::Timeout(timeout));
            }
            match context.replies.recv_timeout(remaining.min(REPLY_POLL)) {
                Ok(message) if message.session_id() != request.session_id => continue,
                Ok(SignalingMessage::Answer { hints, .. }) => break hints,
                Ok(SignalingMessage::Candidate { candidate, .. }) => trickled.push(candidate),
                Ok(SignalingMessage::Bye { reason, .. }) => {
                    return Err(NegotiationError::Rejected(
                        reason.unwrap_or_else(|| "bye".to_string()),
                    ));
                }
                Ok(SignalingMessage::Offer { .. }) => {
                    self.logger.debug("Ignoring offer received while negotiating");
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(NegotiationError::Signaling("reply channel closed".to_string()));
                }
            }
        };

        while let Ok(message) = context.replies.try_recv() {
            if let SignalingMessage::Candidate { session_id, candidate, .. } = message
                && session_id == request.session_id
            {
                trickled.push(candidate);
            }
        }
        Ok((answer, trickled))
    }
}

impl Negotiator for SignalingNegotiator {
    fn negotiate(
        &mut self,
        request: &NegotiationRequest,
        context: &NegotiationContext<'_>,
    ) -> Result<Negotiated> {
        let socket = UdpSocket::bind(self.config.bind_address.as_str())?;
        let hints = self.local_hints(&socket, request)?;
        self.logger.info(&format!(
            "Offering session {} to {} from {}:{}",
            request.session_id, request.remote, hints.address, hints.port
        ));
        context
            .sender
            .send_offer(request.remote.as_str(), &request.session_id, hints)?;

        let (answer, trickled) = self.await_answer(request, context)?;
        self.logger.info(&format!(
            "Answer from {}: {}:{} codecs {:?}, {} candidates",
            request.remote,
            answer.address,
            answer.port,
            answer.codecs,
            answer.candidates.len() + trickled.len()
        ));

        let local_codecs = Codec::parse_list(&self.config.codecs);
        let mut remote_codecs = Codec::parse_list(&answer.codecs);
        if answer.codecs.is_empty() {
            // Devices that omit the list only stream H.264.
            remote_codecs.push(Codec::H264);
        }
        let codec = select_codec(&local_codecs, &remote_codecs)?;

        let (direct, relay) = peer_targets(&answer, &trickled, &self.logger);
        let path = negotiate_path(
            &UdpProber::new(&socket),
            &direct,
            relay,
            self.config.direct_timeout(),
            self.config.relay_timeout(),
            context.cancel,
            &self.logger,
        )?;

        Ok(Negotiated {
            descriptor: TransportDescriptor {
                session_id: request.session_id.clone(),
                path: path.kind,
                endpoint: path.endpoint,
                relay_channel: path.relay_channel,
                codec,
                display_mode: request.display_mode,
                decode_mode: request.decode_mode,
            },
            socket: Some(socket),
        })
    }
}

/// Direct probe targets (answer address first) and the relay, if any.
fn peer_targets(
    answer: &TransportHints,
    trickled: &[String],
    logger: &Logger,
) -> (Vec<SocketAddr>, Option<(SocketAddr, Option<u16>)>) {
    let mut direct = Vec::new();
    let mut relay = None;

    if let Ok(ip) = answer.address.parse::<IpAddr>()
        && answer.port != 0
        && !ip.is_unspecified()
    {
        direct.push(SocketAddr::new(ip, answer.port));
    }

    for line in answer.candidates.iter().chain(trickled) {
        let candidate = match Candidate::parse(line) {
            Ok(candidate) => candidate,
            Err(e) => {
                logger.debug(&format!("Skipping candidate '{}': {}", line, e));
                continue;
            }
        };
        let addr = candidate.socket_addr();
        match candidate.candidate_type {
            CandidateType::Relay => {
                if relay.is_none() {
                    relay = Some((addr, answer.relay_channel));
                }
            }
            _ if !direct.contains(&addr) => direct.push(addr),
            _ => {}
        }
    }
    (direct, relay)
}
