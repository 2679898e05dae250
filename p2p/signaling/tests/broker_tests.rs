mod common;

use common::accept_session;
use logging::{LogLevel, Logger};
use signaling::mqtt::ConnectReturnCode;
use signaling::{
    ConnectionStatus, Inbound, ReconnectPolicy, SignalingClient, SignalingConfig, SignalingError,
    SignalingMessage, TransportHints,
};
use std::net::{Shutdown, TcpListener};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

fn fast_config(port: u16) -> SignalingConfig {
    SignalingConfig::default()
        .with_broker("127.0.0.1", port)
        .with_connect_timeout(Duration::from_secs(2))
        .with_reconnect(ReconnectPolicy {
            base_ms: 50,
            cap_ms: 200,
            jitter: 0.0,
        })
}

fn offer_json(session_id: &str) -> Vec<u8> {
    SignalingMessage::Offer {
        session_id: session_id.to_string(),
        from: "devA".to_string(),
        hints: TransportHints::default(),
    }
    .to_json()
    .unwrap()
}

fn next_session_id(stream: &signaling::MessageStream) -> String {
    match stream.recv_timeout(Duration::from_secs(5)) {
        Ok(Inbound::Signaling(message)) => message.session_id().to_string(),
        other => panic!("expected a signaling message, got {:?}", other),
    }
}

#[test]
fn test_connect_uses_phone_id_and_subscribes_to_inbox() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = thread::spawn(move || {
        let mut session = accept_session(&listener, ConnectReturnCode::Accepted);
        let filters = session.expect_subscribe();
        let publish = session.expect_publish();
        (session.connect.client_id.clone(), filters, publish)
    });

    let client = SignalingClient::connect(&fast_config(port), "phone1", &Logger::disabled()).unwrap();
    assert_eq!(client.status(), ConnectionStatus::Connected);
    client
        .sender()
        .send_offer("devA", "s-42", TransportHints::default())
        .unwrap();

    let (client_id, filters, publish) = broker.join().unwrap();
    assert_eq!(client_id, "phone1");
    assert_eq!(filters, vec!["/yyt/phone1/msg".to_string()]);
    assert_eq!(publish.topic, "/yyt/devA/msg");
    let offer = SignalingMessage::from_json(&publish.payload).unwrap();
    assert_eq!(offer.kind(), "offer");
    assert_eq!(offer.session_id(), "s-42");
}

#[test]
fn test_reconnect_after_drop_resumes_delivery() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let broker = thread::spawn(move || {
        let mut first = accept_session(&listener, ConnectReturnCode::Accepted);
        first.expect_subscribe();
        let extra = first.expect_subscribe();
        first.publish("/yyt/phone1/msg", &offer_json("before-drop"));
        thread::sleep(Duration::from_millis(100));
        first.stream.shutdown(Shutdown::Both).unwrap();

        let mut second = accept_session(&listener, ConnectReturnCode::Accepted);
        let restored = second.expect_subscribe();
        second.publish("/yyt/phone1/msg", &offer_json("after-drop"));
        let _ = done_rx.recv_timeout(Duration::from_secs(5));
        (extra, restored)
    });

    let (logger, capture) = Logger::capturing(LogLevel::Info);
    let mut client = SignalingClient::connect(&fast_config(port), "phone1", &logger).unwrap();
    client.sender().subscribe("/yyt/broadcast").unwrap();
    let stream = client.messages().unwrap();

    assert_eq!(next_session_id(&stream), "before-drop");
    assert_eq!(next_session_id(&stream), "after-drop");
    assert_eq!(client.status(), ConnectionStatus::Connected);

    done_tx.send(()).unwrap();
    let (extra, restored) = broker.join().unwrap();
    assert_eq!(extra, vec!["/yyt/broadcast".to_string()]);
    assert_eq!(
        restored,
        vec!["/yyt/phone1/msg".to_string(), "/yyt/broadcast".to_string()]
    );
    assert!(capture.contains("Broker connection lost"));
    assert!(capture.contains("[SIGNALING]"));
}

#[test]
fn test_application_messages_are_not_signaling() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let broker = thread::spawn(move || {
        let mut session = accept_session(&listener, ConnectReturnCode::Accepted);
        session.expect_subscribe();
        session.publish("/yyt/phone1/msg", b"{\"cmd\":\"battery\",\"level\":80}");
        let _ = done_rx.recv_timeout(Duration::from_secs(5));
    });

    let mut client = SignalingClient::connect(&fast_config(port), "phone1", &Logger::disabled()).unwrap();
    let stream = client.messages().unwrap();
    match stream.recv_timeout(Duration::from_secs(5)) {
        Ok(Inbound::Application { topic, payload }) => {
            assert_eq!(topic, "/yyt/phone1/msg");
            assert!(payload.starts_with(b"{\"cmd\""));
        }
        other => panic!("unexpected {:?}", other),
    }

    done_tx.send(()).unwrap();
    broker.join().unwrap();
}

#[test]
fn test_reconnect_survives_protocol_refusal() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let broker = thread::spawn(move || {
        let mut first = accept_session(&listener, ConnectReturnCode::Accepted);
        first.expect_subscribe();
        first.stream.shutdown(Shutdown::Both).unwrap();

        // Mid-restart broker answering with a bad protocol level.
        let refused = accept_session(&listener, ConnectReturnCode::UnacceptableProtocol);
        drop(refused);

        let mut third = accept_session(&listener, ConnectReturnCode::Accepted);
        third.expect_subscribe();
        third.publish("/yyt/phone1/msg", &offer_json("after-refusal"));
        let _ = done_rx.recv_timeout(Duration::from_secs(5));
    });

    let (logger, capture) = Logger::capturing(LogLevel::Info);
    let mut client = SignalingClient::connect(&fast_config(port), "phone1", &logger).unwrap();
    let stream = client.messages().unwrap();

    assert_eq!(next_session_id(&stream), "after-refusal");
    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert!(capture.contains("Reconnect failed"));
    assert!(!capture.contains("giving up"));

    done_tx.send(()).unwrap();
    broker.join().unwrap();
}

#[test]
fn test_refused_identity_is_auth_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let broker = thread::spawn(move || {
        let _session = accept_session(&listener, ConnectReturnCode::NotAuthorized);
        thread::sleep(Duration::from_millis(200));
    });

    let result = SignalingClient::connect(&fast_config(port), "intruder", &Logger::disabled());
    assert!(matches!(result, Err(SignalingError::AuthRejected(_))));
    broker.join().unwrap();
}

#[test]
fn test_unreachable_after_connect_window() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = fast_config(port).with_connect_timeout(Duration::from_millis(300));

    let started = Instant::now();
    let result = SignalingClient::connect(&config, "phone1", &Logger::disabled());
    assert!(matches!(result, Err(SignalingError::Unreachable(_))));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn test_disconnect_sends_disconnect_packet() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let broker = thread::spawn(move || {
        let mut session = accept_session(&listener, ConnectReturnCode::Accepted);
        session.expect_subscribe();
        session.read_packet()
    });

    let mut client = SignalingClient::connect(&fast_config(port), "phone1", &Logger::disabled()).unwrap();
    let sender = client.sender();
    client.disconnect();
    client.disconnect();

    assert_eq!(broker.join().unwrap(), signaling::mqtt::Packet::Disconnect);
    assert_eq!(client.status(), ConnectionStatus::Closed);
    assert_eq!(
        sender.publish("/yyt/devA/msg", b"{}".to_vec()),
        Err(SignalingError::Closed)
    );
}
