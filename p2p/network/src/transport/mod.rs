//! Transport module - UDP socket wrapper

pub mod udp;

pub use udp::UdpTransport;
