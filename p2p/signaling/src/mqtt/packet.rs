//! MQTT 3.1.1 control packets
//!
//! # Fixed Header (MQTT 3.1.1 Section 2.2)
//!
//! ```text
//!  7 6 5 4   3 2 1 0
//! +-+-+-+-+-+-+-+-+-+
//! | Type  |  Flags  |   byte 1
//! +-+-+-+-+-+-+-+-+-+
//! | Remaining Length|   1-4 bytes, 7 bits each, MSB = continuation
//! +-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Strings are a big-endian `u16` length followed by UTF-8 bytes.

use crate::error::{Result, SignalingError};

pub const PROTOCOL_NAME: &str = "MQTT";
pub const PROTOCOL_LEVEL: u8 = 4;

const MAX_REMAINING_LENGTH: usize = 268_435_455;

const CONNECT: u8 = 1;
const CONNACK: u8 = 2;
const PUBLISH: u8 = 3;
const PUBACK: u8 = 4;
const SUBSCRIBE: u8 = 8;
const SUBACK: u8 = 9;
const PINGREQ: u8 = 12;
const PINGRESP: u8 = 13;
const DISCONNECT: u8 = 14;

const FLAG_USERNAME: u8 = 0x80;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_CLEAN_SESSION: u8 = 0x02;

/// Delivery guarantee of a publish or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(SignalingError::Protocol(format!("invalid QoS {}", other))),
        }
    }
}

/// CONNACK return codes (Section 3.2.2.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    Accepted,
    UnacceptableProtocol,
    IdentifierRejected,
    ServerUnavailable,
    BadCredentials,
    NotAuthorized,
    Other(u8),
}

impl ConnectReturnCode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectReturnCode::Accepted,
            1 => ConnectReturnCode::UnacceptableProtocol,
            2 => ConnectReturnCode::IdentifierRejected,
            3 => ConnectReturnCode::ServerUnavailable,
            4 => ConnectReturnCode::BadCredentials,
            5 => ConnectReturnCode::NotAuthorized,
            other => ConnectReturnCode::Other(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ConnectReturnCode::Accepted => 0,
            ConnectReturnCode::UnacceptableProtocol => 1,
            ConnectReturnCode::IdentifierRejected => 2,
            ConnectReturnCode::ServerUnavailable => 3,
            ConnectReturnCode::BadCredentials => 4,
            ConnectReturnCode::NotAuthorized => 5,
            ConnectReturnCode::Other(code) => *code,
        }
    }

    /// Maps a refusal onto the client error taxonomy. `None` when accepted.
    pub fn to_error(&self) -> Option<SignalingError> {
        match self {
            ConnectReturnCode::Accepted => None,
            ConnectReturnCode::IdentifierRejected => Some(SignalingError::AuthRejected(
                "client identifier rejected".to_string(),
            )),
            ConnectReturnCode::BadCredentials => Some(SignalingError::AuthRejected(
                "bad user name or password".to_string(),
            )),
            ConnectReturnCode::NotAuthorized => {
                Some(SignalingError::AuthRejected("not authorized".to_string()))
            }
            ConnectReturnCode::ServerUnavailable => Some(SignalingError::Unreachable(
                "broker reports service unavailable".to_string(),
            )),
            ConnectReturnCode::UnacceptableProtocol => Some(SignalingError::Protocol(
                "broker does not accept MQTT 3.1.1".to_string(),
            )),
            ConnectReturnCode::Other(code) => Some(SignalingError::Protocol(format!(
                "unknown CONNACK return code {}",
                code
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub client_id: String,
    pub keep_alive: u16,
    pub clean_session: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub topic: String,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    /// Present only for QoS 1 and 2.
    pub packet_id: Option<u16>,
    pub payload: Vec<u8>,
}

impl Publish {
    /// A fire-and-forget publish.
    pub fn at_most_once(topic: &str, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.to_string(),
            qos: QoS::AtMostOnce,
            retain: false,
            dup: false,
            packet_id: None,
            payload,
        }
    }
}

/// The control packets exchanged by the signaling client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    ConnAck {
        session_present: bool,
        code: ConnectReturnCode,
    },
    Publish(Publish),
    PubAck {
        packet_id: u16,
    },
    Subscribe {
        packet_id: u16,
        filters: Vec<(String, QoS)>,
    },
    SubAck {
        packet_id: u16,
        return_codes: Vec<u8>,
    },
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    /// Serializes the packet including its fixed header.
    pub fn encode(&self) -> Vec<u8> {
        let (first_byte, body) = match self {
            Packet::Connect(connect) => (CONNECT << 4, encode_connect(connect)),
            Packet::ConnAck {
                session_present,
                code,
            } => (CONNACK << 4, vec![*session_present as u8, code.as_u8()]),
            Packet::Publish(publish) => encode_publish(publish),
            Packet::PubAck { packet_id } => (PUBACK << 4, packet_id.to_be_bytes().to_vec()),
            Packet::Subscribe { packet_id, filters } => {
                let mut body = packet_id.to_be_bytes().to_vec();
                for (filter, qos) in filters {
                    write_string(&mut body, filter);
                    body.push(*qos as u8);
                }
                ((SUBSCRIBE << 4) | 0x02, body)
            }
            Packet::SubAck {
                packet_id,
                return_codes,
            } => {
                let mut body = packet_id.to_be_bytes().to_vec();
                body.extend_from_slice(return_codes);
                (SUBACK << 4, body)
            }
            Packet::PingReq => (PINGREQ << 4, Vec::new()),
            Packet::PingResp => (PINGRESP << 4, Vec::new()),
            Packet::Disconnect => (DISCONNECT << 4, Vec::new()),
        };

        let mut bytes = Vec::with_capacity(body.len() + 5);
        bytes.push(first_byte);
        encode_remaining_length(body.len(), &mut bytes);
        bytes.extend_from_slice(&body);
        bytes
    }

    /// Decodes one packet from the front of `buf`.
    ///
    /// # Returns
    /// * `Ok(Some((packet, consumed)))` - A complete packet and its size in bytes
    /// * `Ok(None)` - More bytes are needed
    /// * `Err` - The bytes are not a valid packet
    pub fn decode(buf: &[u8]) -> Result<Option<(Packet, usize)>> {
        if buf.len() < 2 {
            return Ok(None);
        }
        let first_byte = buf[0];
        let Some((remaining, length_bytes)) = decode_remaining_length(&buf[1..])? else {
            return Ok(None);
        };
        let header_len = 1 + length_bytes;
        let total = header_len + remaining;
        if buf.len() < total {
            return Ok(None);
        }
        let body = &buf[header_len..total];

        let packet = match first_byte >> 4 {
            CONNECT => Packet::Connect(decode_connect(body)?),
            CONNACK => {
                require_len(body, 2, "CONNACK")?;
                Packet::ConnAck {
                    session_present: body[0] & 0x01 == 1,
                    code: ConnectReturnCode::from_u8(body[1]),
                }
            }
            PUBLISH => Packet::Publish(decode_publish(first_byte & 0x0F, body)?),
            PUBACK => {
                require_len(body, 2, "PUBACK")?;
                Packet::PubAck {
                    packet_id: u16::from_be_bytes([body[0], body[1]]),
                }
            }
            SUBSCRIBE => decode_subscribe(body)?,
            SUBACK => {
                require_len(body, 2, "SUBACK")?;
                Packet::SubAck {
                    packet_id: u16::from_be_bytes([body[0], body[1]]),
                    return_codes: body[2..].to_vec(),
                }
            }
            PINGREQ => Packet::PingReq,
            PINGRESP => Packet::PingResp,
            DISCONNECT => Packet::Disconnect,
            other => {
                return Err(SignalingError::Protocol(format!(
                    "unsupported packet type {}",
                    other
                )));
            }
        };

        Ok(Some((packet, total)))
    }
}

fn encode_connect(connect: &Connect) -> Vec<u8> {
    let mut body = Vec::new();
    write_string(&mut body, PROTOCOL_NAME);
    body.push(PROTOCOL_LEVEL);

    let mut flags = 0u8;
    if connect.clean_session {
        flags |= FLAG_CLEAN_SESSION;
    }
    if connect.username.is_some() {
        flags |= FLAG_USERNAME;
    }
    if connect.password.is_some() {
        flags |= FLAG_PASSWORD;
    }
    body.push(flags);
    body.extend_from_slice(&connect.keep_alive.to_be_bytes());

    write_string(&mut body, &connect.client_id);
    if let Some(username) = &connect.username {
        write_string(&mut body, username);
    }
    if let Some(password) = &connect.password {
        write_string(&mut body, password);
    }
    body
}

fn decode_connect(body: &[u8]) -> Result<Connect> {
    let mut pos = 0;
    let name = read_string(body, &mut pos)?;
    if name != PROTOCOL_NAME {
        return Err(SignalingError::Protocol(format!(
            "unexpected protocol name '{}'",
            name
        )));
    }
    require_len(body, pos + 4, "CONNECT")?;
    let level = body[pos];
    if level != PROTOCOL_LEVEL {
        return Err(SignalingError::Protocol(format!(
            "unsupported protocol level {}",
            level
        )));
    }
    let flags = body[pos + 1];
    let keep_alive = u16::from_be_bytes([body[pos + 2], body[pos + 3]]);
    pos += 4;

    let client_id = read_string(body, &mut pos)?;
    let username = if flags & FLAG_USERNAME != 0 {
        Some(read_string(body, &mut pos)?)
    } else {
        None
    };
    let password = if flags & FLAG_PASSWORD != 0 {
        Some(read_string(body, &mut pos)?)
    } else {
        None
    };

    Ok(Connect {
        client_id,
        keep_alive,
        clean_session: flags & FLAG_CLEAN_SESSION != 0,
        username,
        password,
    })
}

fn encode_publish(publish: &Publish) -> (u8, Vec<u8>) {
    let flags = ((publish.dup as u8) << 3) | ((publish.qos as u8) << 1) | publish.retain as u8;
    let mut body = Vec::with_capacity(publish.topic.len() + publish.payload.len() + 4);
    write_string(&mut body, &publish.topic);
    if publish.qos != QoS::AtMostOnce {
        body.extend_from_slice(&publish.packet_id.unwrap_or(1).to_be_bytes());
    }
    body.extend_from_slice(&publish.payload);
    ((PUBLISH << 4) | flags, body)
}

fn decode_publish(flags: u8, body: &[u8]) -> Result<Publish> {
    let qos = QoS::from_u8((flags >> 1) & 0x03)?;
    let mut pos = 0;
    let topic = read_string(body, &mut pos)?;
    let packet_id = if qos != QoS::AtMostOnce {
        require_len(body, pos + 2, "PUBLISH")?;
        let id = u16::from_be_bytes([body[pos], body[pos + 1]]);
        pos += 2;
        Some(id)
    } else {
        None
    };

    Ok(Publish {
        topic,
        qos,
        retain: flags & 0x01 != 0,
        dup: flags & 0x08 != 0,
        packet_id,
        payload: body[pos..].to_vec(),
    })
}

fn decode_subscribe(body: &[u8]) -> Result<Packet> {
    require_len(body, 2, "SUBSCRIBE")?;
    let packet_id = u16::from_be_bytes([body[0], body[1]]);
    let mut pos = 2;
    let mut filters = Vec::new();
    while pos < body.len() {
        let filter = read_string(body, &mut pos)?;
        require_len(body, pos + 1, "SUBSCRIBE")?;
        let qos = QoS::from_u8(body[pos] & 0x03)?;
        pos += 1;
        filters.push((filter, qos));
    }
    if filters.is_empty() {
        return Err(SignalingError::Protocol(
            "SUBSCRIBE without topic filters".to_string(),
        ));
    }
    Ok(Packet::Subscribe { packet_id, filters })
}

fn encode_remaining_length(mut len: usize, out: &mut Vec<u8>) {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if len == 0 {
            break;
        }
    }
}

/// Returns `(remaining_length, bytes_used)`, or `None` when truncated.
fn decode_remaining_length(bytes: &[u8]) -> Result<Option<(usize, usize)>> {
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for (i, byte) in bytes.iter().enumerate().take(4) {
        value += (*byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            if value > MAX_REMAINING_LENGTH {
                return Err(SignalingError::Protocol("remaining length too large".into()));
            }
            return Ok(Some((value, i + 1)));
        }
        multiplier *= 128;
    }
    if bytes.len() >= 4 {
        return Err(SignalingError::Protocol(
            "malformed remaining length".to_string(),
        ));
    }
    Ok(None)
}

fn write_string(out: &mut Vec<u8>, value: &str) {
    let bytes = value.as_bytes();
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn read_string(body: &[u8], pos: &mut usize) -> Result<String> {
    require_len(body, *pos + 2, "string length")?;
    let len = u16::from_be_bytes([body[*pos], body[*pos + 1]]) as usize;
    let start = *pos + 2;
    require_len(body, start + len, "string")?;
    let value = std::str::from_utf8(&body[start..start + len])
        .map_err(|_| SignalingError::Protocol("string is not UTF-8".to_string()))?;
    *pos = start + len;
    Ok(value.to_string())
}

fn require_len(body: &[u8], needed: usize, what: &str) -> Result<()> {
    if body.len() < needed {
        Err(SignalingError::Protocol(format!("{} truncated", what)))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(bytes: &[u8]) -> Packet {
        let (packet, used) = Packet::decode(bytes).unwrap().unwrap();
        assert_eq!(used, bytes.len());
        packet
    }

    #[test]
    fn test_connect_layout() {
        let connect = Packet::Connect(Connect {
            client_id: "phone1".to_string(),
            keep_alive: 30,
            clean_session: true,
            username: None,
            password: None,
        });
        let bytes = connect.encode();

        assert_eq!(bytes[0], 0x10);
        assert_eq!(bytes[1] as usize, bytes.len() - 2);
        assert_eq!(&bytes[2..8], &[0x00, 0x04, b'M', b'Q', b'T', b'T']);
        assert_eq!(bytes[8], PROTOCOL_LEVEL);
        assert_eq!(bytes[9], FLAG_CLEAN_SESSION);
        assert_eq!(&bytes[10..12], &[0x00, 30]);
        assert_eq!(decode_one(&bytes), connect);
    }

    #[test]
    fn test_connect_with_credentials() {
        let connect = Packet::Connect(Connect {
            client_id: "phone1".to_string(),
            keep_alive: 60,
            clean_session: true,
            username: Some("app".to_string()),
            password: Some("secret".to_string()),
        });
        let bytes = connect.encode();
        assert_eq!(bytes[9], FLAG_CLEAN_SESSION | FLAG_USERNAME | FLAG_PASSWORD);
        assert_eq!(decode_one(&bytes), connect);
    }

    #[test]
    fn test_ping_and_disconnect_are_two_bytes() {
        assert_eq!(Packet::PingReq.encode(), vec![0xC0, 0x00]);
        assert_eq!(Packet::PingResp.encode(), vec![0xD0, 0x00]);
        assert_eq!(Packet::Disconnect.encode(), vec![0xE0, 0x00]);
    }

    #[test]
    fn test_subscribe_sets_reserved_flag() {
        let subscribe = Packet::Subscribe {
            packet_id: 7,
            filters: vec![("/yyt/phone1/msg".to_string(), QoS::AtLeastOnce)],
        };
        let bytes = subscribe.encode();
        assert_eq!(bytes[0], 0x82);
        assert_eq!(decode_one(&bytes), subscribe);
    }

    #[test]
    fn test_qos1_publish_carries_packet_id() {
        let publish = Publish {
            topic: "/yyt/phone1/msg".to_string(),
            qos: QoS::AtLeastOnce,
            retain: false,
            dup: false,
            packet_id: Some(300),
            payload: b"{}".to_vec(),
        };
        let bytes = Packet::Publish(publish.clone()).encode();
        assert_eq!(bytes[0], 0x32);
        assert_eq!(decode_one(&bytes), Packet::Publish(publish));
    }

    #[test]
    fn test_large_payload_uses_multibyte_length() {
        let publish = Publish::at_most_once("/yyt/devA/msg", vec![0xAB; 300]);
        let bytes = Packet::Publish(publish).encode();
        // 2 + 13 topic bytes + 300 payload = 315 = 0xBB 0x02
        assert_eq!(&bytes[1..3], &[0xBB, 0x02]);
        match decode_one(&bytes) {
            Packet::Publish(p) => assert_eq!(p.payload.len(), 300),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_partial_input_needs_more_bytes() {
        let bytes = Packet::Publish(Publish::at_most_once("/t", b"hello".to_vec())).encode();
        for cut in 0..bytes.len() {
            assert_eq!(Packet::decode(&bytes[..cut]).unwrap(), None);
        }
    }

    #[test]
    fn test_two_packets_in_one_buffer() {
        let mut buf = Packet::PingResp.encode();
        buf.extend(Packet::PubAck { packet_id: 9 }.encode());

        let (first, used) = Packet::decode(&buf).unwrap().unwrap();
        assert_eq!(first, Packet::PingResp);
        let (second, _) = Packet::decode(&buf[used..]).unwrap().unwrap();
        assert_eq!(second, Packet::PubAck { packet_id: 9 });
    }

    #[test]
    fn test_connack_refusal_mapping() {
        let bytes = Packet::ConnAck {
            session_present: false,
            code: ConnectReturnCode::NotAuthorized,
        }
        .encode();
        assert_eq!(bytes, vec![0x20, 0x02, 0x00, 0x05]);

        match decode_one(&bytes) {
            Packet::ConnAck { code, .. } => {
                assert!(matches!(code.to_error(), Some(SignalingError::AuthRejected(_))))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            ConnectReturnCode::ServerUnavailable.to_error(),
            Some(SignalingError::Unreachable(_))
        ));
        assert_eq!(ConnectReturnCode::Accepted.to_error(), None);
    }

    #[test]
    fn test_rejects_unknown_type_and_bad_length() {
        assert!(Packet::decode(&[0xF0, 0x00]).is_err());
        assert!(Packet::decode(&[0x30, 0xFF, 0xFF, 0xFF, 0xFF]).is_err());
    }
}
