//! Phone and device identities
//!
//! Both ids end up inside MQTT topic names, so they must be non-empty and
//! free of topic separators and wildcards.

use crate::error::{EngineError, Result};
use std::fmt;

const FORBIDDEN: [char; 3] = ['/', '+', '#'];

fn validate(kind: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidArgument(format!("{} must not be empty", kind)));
    }
    if let Some(bad) = trimmed.chars().find(|c| FORBIDDEN.contains(c) || c.is_control()) {
        return Err(EngineError::InvalidArgument(format!(
            "{} '{}' contains forbidden character {:?}",
            kind, trimmed, bad
        )));
    }
    Ok(trimmed.to_string())
}

/// Identity this phone registers with the signaling broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneId(String);

impl PhoneId {
    pub fn parse(value: &str) -> Result<Self> {
        validate("phone id", value).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the remote camera device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn parse(value: &str) -> Result<Self> {
        validate("device id", value).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local phone plus the peer it is paired with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub phone: PhoneId,
    pub device: Option<DeviceId>,
}

impl Identity {
    pub fn new(phone: PhoneId) -> Self {
        Self { phone, device: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids_are_trimmed() {
        assert_eq!(PhoneId::parse("  phone-1 ").unwrap().as_str(), "phone-1");
        assert_eq!(DeviceId::parse("cam_07").unwrap().to_string(), "cam_07");
    }

    #[test]
    fn test_rejects_empty_and_topic_characters() {
        assert!(PhoneId::parse("").is_err());
        assert!(PhoneId::parse("   ").is_err());
        assert!(DeviceId::parse("cam/1").is_err());
        assert!(DeviceId::parse("cam+").is_err());
        assert!(DeviceId::parse("#").is_err());
    }

    #[test]
    fn test_invalid_id_maps_to_invalid_argument() {
        let err = DeviceId::parse("a/b").unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }
}
