use logging::Logger;
use media::video::nal::join_annex_b;
use network::{
    Channel, ChannelConfig, ChannelTarget, Datagram, FramePacket, H264Depacketizer,
    TransportError,
};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(3);

fn loopback_socket() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").unwrap()
}

fn config() -> ChannelConfig {
    ChannelConfig::default().with_bind_address("127.0.0.1:0")
}

fn channel_pair(config: &ChannelConfig) -> (Channel, Channel) {
    let a = loopback_socket();
    let b = loopback_socket();
    let (addr_a, addr_b) = (a.local_addr().unwrap(), b.local_addr().unwrap());
    let sender = Channel::open(
        ChannelTarget::direct(addr_b),
        Some(a),
        0,
        config,
        &Logger::disabled(),
    )
    .unwrap();
    let receiver = Channel::open(
        ChannelTarget::direct(addr_a),
        Some(b),
        7,
        config,
        &Logger::disabled(),
    )
    .unwrap();
    (sender, receiver)
}

fn slice_unit(index: u8) -> Vec<u8> {
    let header = if index % 4 == 0 { 0x65 } else { 0x41 };
    join_annex_b([&[header, index + 1, 0xAA, 0xBB][..]])
}

fn collect_media(
    stream: &network::PacketStream,
    count: usize,
) -> Vec<FramePacket> {
    let deadline = Instant::now() + WAIT;
    let mut packets = Vec::new();
    while packets.len() < count && Instant::now() < deadline {
        if let Ok(item) = stream.recv_timeout(Duration::from_millis(50)) {
            packets.push(item.unwrap());
        }
    }
    packets
}

#[test]
fn test_units_arrive_in_order_with_generation() {
    let (sender, mut receiver) = channel_pair(&config());
    let stream = receiver.packets().unwrap();
    assert!(receiver.packets().is_none());
    assert_eq!(stream.generation(), 7);

    for index in 0..10u8 {
        sender.send_unit(&slice_unit(index), index as u32 * 3000).unwrap();
    }

    let packets = collect_media(&stream, 10);
    assert_eq!(packets.len(), 10);
    assert!(packets.iter().all(|p| p.generation == 7 && p.marker));
    assert_eq!(
        packets.iter().map(|p| p.sequence).collect::<Vec<_>>(),
        (0..10).collect::<Vec<_>>()
    );
    assert!(packets[0].keyframe && !packets[1].keyframe && packets[4].keyframe);

    let mut depacketizer = H264Depacketizer::new();
    let units: Vec<_> = packets.iter().flat_map(|p| depacketizer.push(p)).collect();
    assert_eq!(units[3].data, slice_unit(3));
    assert_eq!(units[3].timestamp, 9000);
}

#[test]
fn test_keepalive_death_is_reported() {
    let silent = loopback_socket();
    let config = config().with_keepalive(Duration::from_millis(50), 3);
    let mut channel = Channel::open(
        ChannelTarget::direct(silent.local_addr().unwrap()),
        None,
        4,
        &config,
        &Logger::disabled(),
    )
    .unwrap();
    let stream = channel.packets().unwrap();

    let started = Instant::now();
    let item = stream.recv_timeout(WAIT).unwrap();
    assert_eq!(
        item.unwrap_err(),
        TransportError::Dead {
            generation: 4,
            missed_acks: 3
        }
    );
    assert!(started.elapsed() >= Duration::from_millis(140));
    assert!(!channel.is_alive());
    assert!(matches!(
        channel.send_unit(&slice_unit(0), 0),
        Err(TransportError::Closed)
    ));
}

#[test]
fn test_keepalives_keep_idle_pair_alive() {
    let config = config().with_keepalive(Duration::from_millis(40), 2);
    let (sender, mut receiver) = channel_pair(&config);
    let stream = receiver.packets().unwrap();

    thread::sleep(Duration::from_millis(400));
    assert!(sender.is_alive() && receiver.is_alive());
    assert!(stream.recv_timeout(Duration::from_millis(10)).is_err());
    assert!(receiver.stats().keepalive_acks > 0);
}

#[test]
fn test_close_sends_bye() {
    let (mut sender, mut receiver) = channel_pair(&config());
    let stream = receiver.packets().unwrap();

    sender.send_unit(&slice_unit(0), 0).unwrap();
    assert_eq!(collect_media(&stream, 1).len(), 1);

    sender.close();
    sender.close();
    let item = stream.recv_timeout(WAIT).unwrap();
    assert_eq!(item.unwrap_err(), TransportError::RemoteBye);
}

#[test]
fn test_foreign_datagrams_are_ignored() {
    let (_sender, mut receiver) = channel_pair(&config());
    let stream = receiver.packets().unwrap();

    let stranger = loopback_socket();
    let bogus = Datagram::media(FramePacket::new(0, 0, vec![0x65, 1]).with_marker(true));
    stranger
        .send_to(&bogus.encode(), receiver.local_addr())
        .unwrap();

    assert!(stream.recv_timeout(Duration::from_millis(300)).is_err());
    assert_eq!(receiver.stats().packets_received, 0);
}

/// Forwards datagrams between two channels and drops the first copy of
/// one media sequence number.
fn lossy_proxy(drop_sequence: u32, stop: Arc<AtomicBool>) -> (SocketAddr, thread::JoinHandle<()>) {
    let proxy = loopback_socket();
    let addr = proxy.local_addr().unwrap();
    proxy
        .set_read_timeout(Some(Duration::from_millis(20)))
        .unwrap();
    let handle = thread::spawn(move || {
        let mut peers: Vec<SocketAddr> = Vec::new();
        let mut dropped = false;
        let mut buf = [0u8; 2048];
        while !stop.load(Ordering::SeqCst) {
            let Ok((size, from)) = proxy.recv_from(&mut buf) else {
                continue;
            };
            if !peers.contains(&from) {
                peers.push(from);
            }
            if !dropped
                && let Ok(Datagram::Media { packet, .. }) = Datagram::decode(&buf[..size])
                && packet.sequence == drop_sequence
            {
                dropped = true;
                continue;
            }
            for peer in peers.iter().filter(|p| **p != from) {
                let _ = proxy.send_to(&buf[..size], peer);
            }
        }
    });
    (addr, handle)
}

#[test]
fn test_nack_recovers_dropped_packet() {
    let stop = Arc::new(AtomicBool::new(false));
    let (proxy, proxy_thread) = lossy_proxy(3, Arc::clone(&stop));
    let config = config();

    let mut receiver = Channel::open(
        ChannelTarget::direct(proxy),
        Some(loopback_socket()),
        0,
        &config,
        &Logger::disabled(),
    )
    .unwrap();
    let stream = receiver.packets().unwrap();
    let sender = Channel::open(
        ChannelTarget::direct(proxy),
        Some(loopback_socket()),
        0,
        &config,
        &Logger::disabled(),
    )
    .unwrap();

    // Let the receiver's first keepalive register it with the proxy.
    thread::sleep(Duration::from_millis(100));
    for index in 0..8u8 {
        sender.send_unit(&slice_unit(index), index as u32 * 3000).unwrap();
    }

    let packets = collect_media(&stream, 8);
    thread::sleep(Duration::from_millis(100));
    stop.store(true, Ordering::SeqCst);
    proxy_thread.join().unwrap();

    assert_eq!(
        packets.iter().map(|p| p.sequence).collect::<Vec<_>>(),
        (0..8).collect::<Vec<_>>()
    );
    let stats = receiver.stats();
    assert!(stats.nacks_sent >= 1);
    assert_eq!(stats.retransmits_received, 1);
    assert_eq!(stats.lost, 0);
    assert_eq!(sender.stats().retransmitted, 1);
}
