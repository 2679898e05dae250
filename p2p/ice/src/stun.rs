//! STUN Binding (RFC 5389)
//!
//! Only what server-reflexive discovery needs: a Binding Request and the
//! XOR-MAPPED-ADDRESS of the matching success response. The query runs on
//! the media socket itself so the reported mapping is the one the peer
//! will see.
//!
//! ```text
//!  0                   1                   2                   3
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |0 0|     STUN Message Type     |         Message Length        |
//! |                         Magic Cookie                          |
//! |                     Transaction ID (96 bits)                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::errors::{IceError, Result};
use rand::RngCore;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

pub const MAGIC_COOKIE: u32 = 0x2112_A442;
pub const BINDING_REQUEST: u16 = 0x0001;
pub const BINDING_SUCCESS: u16 = 0x0101;
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;

const HEADER_SIZE: usize = 20;
const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;
const MAX_STUN_MESSAGE_SIZE: usize = 548;
const RETRANSMIT_INTERVAL: Duration = Duration::from_millis(500);

pub type TransactionId = [u8; 12];

pub fn random_transaction_id() -> TransactionId {
    let mut id = [0u8; 12];
    rand::rng().fill_bytes(&mut id);
    id
}

/// Whether `bytes` looks like a STUN message (first two bits zero and the
/// magic cookie in place).
pub fn is_stun_message(bytes: &[u8]) -> bool {
    bytes.len() >= HEADER_SIZE
        && bytes[0] & 0xC0 == 0
        && u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) == MAGIC_COOKIE
}

pub fn encode_binding_request(transaction_id: &TransactionId) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_SIZE);
    bytes.extend_from_slice(&BINDING_REQUEST.to_be_bytes());
    bytes.extend_from_slice(&0u16.to_be_bytes());
    bytes.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
    bytes.extend_from_slice(transaction_id);
    bytes
}

/// Builds a Binding success response carrying `mapped` (used by test
/// servers and by peers that answer STUN themselves).
pub fn encode_binding_success(transaction_id: &TransactionId, mapped: SocketAddr) -> Vec<u8> {
    let value = encode_xor_mapped_address(mapped, transaction_id);
    let mut bytes = Vec::with_capacity(HEADER_SIZE + 4 + value.len());
    bytes.extend_from_slice(&BINDING_SUCCESS.to_be_bytes());
    bytes.extend_from_slice(&((4 + value.len()) as u16).to_be_bytes());
    bytes.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
    bytes.extend_from_slice(transaction_id);
    bytes.extend_from_slice(&ATTR_XOR_MAPPED_ADDRESS.to_be_bytes());
    bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
    bytes.extend_from_slice(&value);
    bytes
}

/// Extracts the reflexive address from a Binding success response for
/// `transaction_id`. Returns `None` for anything else.
pub fn decode_binding_success(bytes: &[u8], transaction_id: &TransactionId) -> Option<SocketAddr> {
    if !is_stun_message(bytes) {
        return None;
    }
    if u16::from_be_bytes([bytes[0], bytes[1]]) != BINDING_SUCCESS || &bytes[8..20] != transaction_id {
        return None;
    }
    let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    let attrs = bytes.get(HEADER_SIZE..HEADER_SIZE + length)?;

    let mut offset = 0;
    while offset + 4 <= attrs.len() {
        let attr_type = u16::from_be_bytes([attrs[offset], attrs[offset + 1]]);
        let attr_length = u16::from_be_bytes([attrs[offset + 2], attrs[offset + 3]]) as usize;
        offset += 4;
        let value = attrs.get(offset..offset + attr_length)?;
        if attr_type == ATTR_XOR_MAPPED_ADDRESS {
            return decode_xor_mapped_address(value, transaction_id);
        }
        offset += attr_length + (4 - attr_length % 4) % 4;
    }
    None
}

fn xor_mask(transaction_id: &TransactionId) -> [u8; 16] {
    let mut mask = [0u8; 16];
    mask[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    mask[4..].copy_from_slice(transaction_id);
    mask
}

fn encode_xor_mapped_address(addr: SocketAddr, transaction_id: &TransactionId) -> Vec<u8> {
    let mask = xor_mask(transaction_id);
    let port = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;
    let mut value = vec![0u8];
    match addr.ip() {
        IpAddr::V4(ip) => {
            value.push(FAMILY_IPV4);
            value.extend_from_slice(&port.to_be_bytes());
            value.extend(ip.octets().iter().zip(mask.iter()).map(|(b, m)| b ^ m));
        }
        IpAddr::V6(ip) => {
            value.push(FAMILY_IPV6);
            value.extend_from_slice(&port.to_be_bytes());
            value.extend(ip.octets().iter().zip(mask.iter()).map(|(b, m)| b ^ m));
        }
    }
    value
}

fn decode_xor_mapped_address(bytes: &[u8], transaction_id: &TransactionId) -> Option<SocketAddr> {
    if bytes.len() < 8 {
        return None;
    }
    let mask = xor_mask(transaction_id);
    let port = u16::from_be_bytes([bytes[2], bytes[3]]) ^ (MAGIC_COOKIE >> 16) as u16;
    match bytes[1] {
        FAMILY_IPV4 => {
            let ip = Ipv4Addr::new(
                bytes[4] ^ mask[0],
                bytes[5] ^ mask[1],
                bytes[6] ^ mask[2],
                bytes[7] ^ mask[3],
            );
            Some(SocketAddr::new(IpAddr::V4(ip), port))
        }
        FAMILY_IPV6 if bytes.len() >= 20 => {
            let mut octets = [0u8; 16];
            for (i, octet) in octets.iter_mut().enumerate() {
                *octet = bytes[4 + i] ^ mask[i];
            }
            Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        _ => None,
    }
}

/// Asks `server` for this socket's reflexive address.
///
/// The request is retransmitted every 500ms until `timeout`. Unrelated
/// datagrams arriving meanwhile are ignored. The socket's read timeout is
/// left modified.
pub fn query_reflexive_address(
    socket: &UdpSocket,
    server: SocketAddr,
    timeout: Duration,
) -> Result<SocketAddr> {
    let transaction_id = random_transaction_id();
    let request = encode_binding_request(&transaction_id);
    let deadline = Instant::now() + timeout;
    let mut next_send = Instant::now();
    let mut buf = [0u8; MAX_STUN_MESSAGE_SIZE];

    socket.set_read_timeout(Some(Duration::from_millis(50)))?;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(IceError::StunFailed(format!("no response from {}", server)));
        }
        if now >= next_send {
            socket.send_to(&request, server)?;
            next_send = now + RETRANSMIT_INTERVAL;
        }
        match socket.recv_from(&mut buf) {
            Ok((size, from)) if from == server => {
                if let Some(mapped) = decode_binding_success(&buf[..size], &transaction_id) {
                    return Ok(mapped);
                }
            }
            Ok(_) => {}
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_binding_request_header() {
        let id = [7u8; 12];
        let bytes = encode_binding_request(&id);
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[0..4], &[0x00, 0x01, 0x00, 0x00]);
        assert_eq!(&bytes[4..8], &[0x21, 0x12, 0xA4, 0x42]);
        assert!(is_stun_message(&bytes));
    }

    #[test]
    fn test_xor_mapped_address_rfc_example() {
        // RFC 5769 2.2: 192.0.2.1:32853
        let id: TransactionId = [
            0xb7, 0xe7, 0xa7, 0x01, 0xbc, 0x34, 0xd6, 0x86, 0xfa, 0x87, 0xdf, 0xae,
        ];
        let value = [0x00, 0x01, 0xa1, 0x47, 0xe1, 0x12, 0xa6, 0x43];
        assert_eq!(
            decode_xor_mapped_address(&value, &id),
            Some("192.0.2.1:32853".parse().unwrap())
        );
    }

    #[test]
    fn test_success_response_for_other_transaction_is_ignored() {
        let mapped: SocketAddr = "[2001:db8::5]:6000".parse().unwrap();
        let response = encode_binding_success(&[1u8; 12], mapped);
        assert_eq!(decode_binding_success(&response, &[1u8; 12]), Some(mapped));
        assert_eq!(decode_binding_success(&response, &[2u8; 12]), None);
        assert_eq!(decode_binding_success(b"P2PV not stun at all", &[1u8; 12]), None);
    }

    #[test]
    fn test_query_against_local_server() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();
        let responder = thread::spawn(move || {
            let mut buf = [0u8; 128];
            let (size, from) = server.recv_from(&mut buf).unwrap();
            assert!(is_stun_message(&buf[..size]));
            let mut id = [0u8; 12];
            id.copy_from_slice(&buf[8..20]);
            // Noise first, then the real answer.
            server.send_to(b"garbage", from).unwrap();
            let mapped: SocketAddr = "203.0.113.9:61000".parse().unwrap();
            server.send_to(&encode_binding_success(&id, mapped), from).unwrap();
        });

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mapped = query_reflexive_address(&client, server_addr, Duration::from_secs(2)).unwrap();
        assert_eq!(mapped, "203.0.113.9:61000".parse().unwrap());
        responder.join().unwrap();
    }

    #[test]
    fn test_query_times_out() {
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        let result = query_reflexive_address(
            &client,
            silent.local_addr().unwrap(),
            Duration::from_millis(200),
        );
        assert!(matches!(result, Err(IceError::StunFailed(_))));
    }
}
