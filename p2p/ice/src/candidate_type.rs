//! ICE candidate types.

use crate::errors::IceError;

/// Where a candidate address came from (RFC 5245 Section 4.1.1).
///
/// - **Host**: an address on a local interface
/// - **Srflx**: the NAT mapping reported by a STUN server
/// - **Relay**: an address allocated on a relay server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CandidateType {
    #[default]
    Host,
    Srflx,
    Relay,
}

impl CandidateType {
    /// Parses `"host"`, `"srflx"` or `"relay"`.
    pub fn parse(s: &str) -> Result<Self, IceError> {
        match s {
            "host" => Ok(CandidateType::Host),
            "srflx" => Ok(CandidateType::Srflx),
            "relay" => Ok(CandidateType::Relay),
            _ => Err(IceError::InvalidCandidateType(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateType::Host => "host",
            CandidateType::Srflx => "srflx",
            CandidateType::Relay => "relay",
        }
    }

    /// Whether the candidate can be probed without a relay.
    pub fn is_direct(&self) -> bool {
        !matches!(self, CandidateType::Relay)
    }

    /// Type preference from RFC 5245 Section 4.1.2.2.
    pub fn type_preference(&self) -> u32 {
        match self {
            CandidateType::Host => 126,
            CandidateType::Srflx => 100,
            CandidateType::Relay => 0,
        }
    }
}

impl std::fmt::Display for CandidateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_types() {
        assert_eq!(CandidateType::parse("host").unwrap(), CandidateType::Host);
        assert_eq!(CandidateType::parse("srflx").unwrap(), CandidateType::Srflx);
        assert_eq!(CandidateType::parse("relay").unwrap(), CandidateType::Relay);
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert!(CandidateType::parse("HOST").is_err());
        assert!(matches!(
            CandidateType::parse("prflx"),
            Err(IceError::InvalidCandidateType(t)) if t == "prflx"
        ));
    }

    #[test]
    fn test_only_relay_is_indirect() {
        assert!(CandidateType::Host.is_direct());
        assert!(CandidateType::Srflx.is_direct());
        assert!(!CandidateType::Relay.is_direct());
    }

    #[test]
    fn test_display_matches_as_str() {
        for t in [CandidateType::Host, CandidateType::Srflx, CandidateType::Relay] {
            assert_eq!(t.to_string(), t.as_str());
        }
    }
}
