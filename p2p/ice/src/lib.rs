//! ICE Module - candidates and UDP path discovery
//!
//! Candidate model after RFC 5245, local address detection, STUN binding
//! (RFC 5389) for server-reflexive addresses, TURN-style ChannelData framing
//! for relayed paths and the probe exchange that proves a path works.

pub mod candidate;
pub mod candidate_type;
pub mod connectivity;
pub mod errors;
pub mod gather;
pub mod ip_detection;
pub mod relay;
pub mod stun;

pub use candidate::{Candidate, TransportProtocol};
pub use candidate_type::CandidateType;
pub use connectivity::{Probe, answer_probe, run_connectivity_check};
pub use errors::{IceError, Result};
pub use gather::{GatherOptions, gather_candidates};
pub use ip_detection::detect_local_ip;
pub use relay::ChannelData;
