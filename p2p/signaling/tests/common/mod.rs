//! Fake MQTT broker speaking just enough 3.1.1 for the client tests.

#![allow(dead_code)]

use signaling::mqtt::{Connect, ConnectReturnCode, Packet, Publish};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

pub struct BrokerSession {
    pub stream: TcpStream,
    pub connect: Connect,
    buffer: Vec<u8>,
}

impl BrokerSession {
    /// Reads the next packet, failing the test after five seconds.
    pub fn read_packet(&mut self) -> Packet {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some((packet, used)) = Packet::decode(&self.buffer).expect("valid MQTT") {
                self.buffer.drain(..used);
                return packet;
            }
            assert!(Instant::now() < deadline, "timed out waiting for a packet");
            let mut chunk = [0u8; 1024];
            match self.stream.read(&mut chunk) {
                Ok(0) => panic!("client closed the connection"),
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) => panic!("read failed: {}", e),
            }
        }
    }

    /// Reads packets until a SUBSCRIBE arrives and returns its filters.
    pub fn expect_subscribe(&mut self) -> Vec<String> {
        loop {
            if let Packet::Subscribe { filters, .. } = self.read_packet() {
                return filters.into_iter().map(|(topic, _)| topic).collect();
            }
        }
    }

    /// Reads packets until a PUBLISH arrives.
    pub fn expect_publish(&mut self) -> Publish {
        loop {
            if let Packet::Publish(publish) = self.read_packet() {
                return publish;
            }
        }
    }

    pub fn publish(&mut self, topic: &str, payload: &[u8]) {
        let packet = Packet::Publish(Publish::at_most_once(topic, payload.to_vec()));
        self.stream.write_all(&packet.encode()).expect("write publish");
    }
}

/// Accepts one client, reads its CONNECT and answers with `code`.
pub fn accept_session(listener: &TcpListener, code: ConnectReturnCode) -> BrokerSession {
    let (stream, _) = listener.accept().expect("accept");
    stream
        .set_read_timeout(Some(Duration::from_millis(100)))
        .expect("read timeout");
    let mut session = BrokerSession {
        stream,
        connect: Connect {
            client_id: String::new(),
            keep_alive: 0,
            clean_session: true,
            username: None,
            password: None,
        },
        buffer: Vec::new(),
    };

    match session.read_packet() {
        Packet::Connect(connect) => session.connect = connect,
        other => panic!("expected CONNECT, got {:?}", other),
    }
    let connack = Packet::ConnAck {
        session_present: false,
        code,
    };
    session
        .stream
        .write_all(&connack.encode())
        .expect("write CONNACK");
    session
}
