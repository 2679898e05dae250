//! Minimal MQTT 3.1.1 codec: the control packets a subscribing client needs.

mod packet;

pub use packet::{Connect, ConnectReturnCode, Packet, Publish, QoS};
