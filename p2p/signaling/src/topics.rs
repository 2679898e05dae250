//! Topic naming
//!
//! Every identity owns one inbox topic, `/{prefix}/{id}/msg`. A phone
//! subscribes to its own inbox and publishes into the device's inbox.

/// Prefix used by the deployed device firmware.
pub const DEFAULT_TOPIC_PREFIX: &str = "yyt";

/// Builds the inbox topic for `id`.
pub fn inbox_topic(prefix: &str, id: &str) -> String {
    format!("/{}/{}/msg", prefix.trim_matches('/'), id)
}

/// Extracts the identity owning an inbox topic, if `topic` is one.
pub fn inbox_owner<'a>(prefix: &str, topic: &'a str) -> Option<&'a str> {
    let prefix = prefix.trim_matches('/');
    let rest = topic.strip_prefix('/')?.strip_prefix(prefix)?.strip_prefix('/')?;
    let id = rest.strip_suffix("/msg")?;
    if id.is_empty() || id.contains('/') {
        None
    } else {
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbox_topic_format() {
        assert_eq!(inbox_topic("yyt", "devA"), "/yyt/devA/msg");
        assert_eq!(inbox_topic("/yyt/", "phone1"), "/yyt/phone1/msg");
    }

    #[test]
    fn test_inbox_owner() {
        assert_eq!(inbox_owner("yyt", "/yyt/devA/msg"), Some("devA"));
        assert_eq!(inbox_owner("yyt", "/other/devA/msg"), None);
        assert_eq!(inbox_owner("yyt", "/yyt//msg"), None);
        assert_eq!(inbox_owner("yyt", "/yyt/a/b/msg"), None);
    }
}
