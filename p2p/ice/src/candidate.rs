//! ICE candidate representation and parsing.
//!
//! Candidates travel inside signaling messages as the attribute value of an
//! SDP `a=candidate:` line, without the prefix.

use crate::{candidate_type::CandidateType, errors::IceError};
use std::net::{IpAddr, SocketAddr};

/// Transport protocol of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    Udp,
    Tcp,
}

impl TransportProtocol {
    pub fn parse(s: &str) -> Result<Self, IceError> {
        match s.to_ascii_uppercase().as_str() {
            "UDP" => Ok(TransportProtocol::Udp),
            "TCP" => Ok(TransportProtocol::Tcp),
            _ => Err(IceError::InvalidCandidate(format!(
                "unknown transport '{}'",
                s
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Udp => "UDP",
            TransportProtocol::Tcp => "TCP",
        }
    }
}

/// An ICE candidate according to RFC 5245.
///
/// ```text
/// <foundation> <component-id> <transport> <priority> <address> <port> typ <type> [raddr <rel-addr>] [rport <rel-port>]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub foundation: String,
    pub component_id: u32,
    pub transport: TransportProtocol,
    pub priority: u32,
    pub address: IpAddr,
    pub port: u16,
    pub candidate_type: CandidateType,
    pub related_address: Option<SocketAddr>,
}

impl Candidate {
    /// Host candidate for a locally bound UDP socket.
    pub fn host(address: SocketAddr) -> Self {
        Self::with_type(CandidateType::Host, "1", address, None)
    }

    /// Server-reflexive candidate: the NAT mapping of `base`.
    pub fn server_reflexive(mapped: SocketAddr, base: SocketAddr) -> Self {
        Self::with_type(CandidateType::Srflx, "2", mapped, Some(base))
    }

    /// Relay candidate allocated on a relay server.
    pub fn relay(address: SocketAddr) -> Self {
        Self::with_type(CandidateType::Relay, "3", address, None)
    }

    fn with_type(
        candidate_type: CandidateType,
        foundation: &str,
        address: SocketAddr,
        related_address: Option<SocketAddr>,
    ) -> Self {
        Self {
            foundation: foundation.to_string(),
            component_id: 1,
            transport: TransportProtocol::Udp,
            priority: Self::calculate_priority(candidate_type.type_preference(), 65_535, 1),
            address: address.ip(),
            port: address.port(),
            candidate_type,
            related_address,
        }
    }

    /// Parses a candidate attribute value, with or without the
    /// `candidate:` prefix.
    ///
    /// # Returns
    /// * `Ok(Candidate)` - Successfully parsed candidate
    /// * `Err(IceError)` - If the format is invalid
    pub fn parse(value: &str) -> Result<Self, IceError> {
        let value = value.trim();
        let value = value.strip_prefix("a=").unwrap_or(value);
        let value = value.strip_prefix("candidate:").unwrap_or(value);

        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() < 8 {
            return Err(IceError::InvalidCandidate(format!(
                "expected at least 8 fields, got {}",
                parts.len()
            )));
        }

        let foundation = parts[0].to_string();
        let component_id: u32 = parts[1]
            .parse()
            .map_err(|_| IceError::InvalidCandidate(format!("bad component '{}'", parts[1])))?;
        if component_id != 1 && component_id != 2 {
            return Err(IceError::InvalidCandidate(format!(
                "component id {} out of range",
                component_id
            )));
        }
        let transport = TransportProtocol::parse(parts[2])?;
        let priority: u32 = parts[3]
            .parse()
            .map_err(|_| IceError::InvalidCandidate(format!("bad priority '{}'", parts[3])))?;
        let address: IpAddr = parts[4]
            .parse()
            .map_err(|_| IceError::InvalidCandidate(format!("bad address '{}'", parts[4])))?;
        let port: u16 = parts[5]
            .parse()
            .map_err(|_| IceError::InvalidCandidate(format!("bad port '{}'", parts[5])))?;
        if parts[6] != "typ" {
            return Err(IceError::InvalidCandidate("missing 'typ'".to_string()));
        }
        let candidate_type = CandidateType::parse(parts[7])?;

        let mut related_ip: Option<IpAddr> = None;
        let mut related_port: Option<u16> = None;
        let mut i = 8;
        while i < parts.len() {
            match parts[i] {
                "raddr" if i + 1 < parts.len() => {
                    related_ip = parts[i + 1].parse().ok();
                    i += 2;
                }
                "rport" if i + 1 < parts.len() => {
                    related_port = parts[i + 1].parse().ok();
                    i += 2;
                }
                _ => i += 1,
            }
        }

        Ok(Candidate {
            foundation,
            component_id,
            transport,
            priority,
            address,
            port,
            candidate_type,
            related_address: related_ip.map(|ip| SocketAddr::new(ip, related_port.unwrap_or(0))),
        })
    }

    /// Priority = (2^24)*(type preference) + (2^8)*(local preference) + (256 - component ID)
    pub fn calculate_priority(type_pref: u32, local_pref: u32, component_id: u32) -> u32 {
        (type_pref << 24) + (local_pref << 8) + (256 - component_id)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// The attribute value carried in signaling messages.
    pub fn to_sdp_value(&self) -> String {
        let mut line = format!(
            "{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component_id,
            self.transport.as_str(),
            self.priority,
            self.address,
            self.port,
            self.candidate_type
        );
        if let Some(related) = self.related_address {
            line.push_str(&format!(" raddr {} rport {}", related.ip(), related.port()));
        }
        line
    }
}

impl std::fmt::Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "candidate:{}", self.to_sdp_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_parse_host_candidate() {
        let candidate = Candidate::parse("1 1 UDP 2130706431 192.168.1.20 40000 typ host").unwrap();
        assert_eq!(candidate.foundation, "1");
        assert_eq!(candidate.transport, TransportProtocol::Udp);
        assert_eq!(candidate.priority, 2_130_706_431);
        assert_eq!(candidate.socket_addr(), "192.168.1.20:40000".parse().unwrap());
        assert_eq!(candidate.candidate_type, CandidateType::Host);
        assert_eq!(candidate.related_address, None);
    }

    #[test]
    fn test_parse_srflx_with_related_address() {
        let candidate = Candidate::parse(
            "candidate:2 1 UDP 1694498815 203.0.113.1 54321 typ srflx raddr 192.168.1.1 rport 8080",
        )
        .unwrap();
        assert_eq!(candidate.candidate_type, CandidateType::Srflx);
        assert_eq!(candidate.related_address, Some("192.168.1.1:8080".parse().unwrap()));
    }

    #[test]
    fn test_parse_accepts_lowercase_transport() {
        let candidate = Candidate::parse("3 1 udp 16777215 198.51.100.1 3478 typ relay").unwrap();
        assert_eq!(candidate.transport, TransportProtocol::Udp);
        assert_eq!(candidate.candidate_type, CandidateType::Relay);
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(Candidate::parse("1 1 UDP 2130706431 192.168.1.1").is_err());
        assert!(Candidate::parse("1 3 UDP 2130706431 192.168.1.1 8080 typ host").is_err());
        assert!(Candidate::parse("1 1 SCTP 2130706431 192.168.1.1 8080 typ host").is_err());
        assert!(Candidate::parse("1 1 UDP 2130706431 192.168.1.1 8080 type host").is_err());
        assert!(Candidate::parse("1 1 UDP 2130706431 not-an-ip 8080 typ host").is_err());
    }

    #[test]
    fn test_host_priority_matches_rfc_formula() {
        let candidate = Candidate::host(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 5000));
        assert_eq!(candidate.priority, 2_130_706_431);
        assert!(candidate.priority > Candidate::relay("198.51.100.1:3478".parse().unwrap()).priority);
    }

    #[test]
    fn test_sdp_value_parses_back() {
        let srflx = Candidate::server_reflexive(
            "203.0.113.7:61000".parse().unwrap(),
            "192.168.1.20:40000".parse().unwrap(),
        );
        let line = srflx.to_sdp_value();
        assert!(line.ends_with("typ srflx raddr 192.168.1.20 rport 40000"));
        assert_eq!(Candidate::parse(&line).unwrap(), srflx);
        assert!(srflx.to_string().starts_with("candidate:2 1 UDP"));
    }
}
