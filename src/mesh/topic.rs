//! MQTT topic model.
//!
//! Meshtastic gateways publish on `<root>/2/e/<channel>/<gateway_id>`; JSON uplinks use
//! `<root>/2/json/<channel>/<gateway_id>` and map reports `<root>/2/map/<gateway_id>`,
//! so the channel name is always the second-to-last segment.

/// Subscription wildcard; never valid on a received topic.
pub const WILDCARD: &str = "#";
/// Deprecated node status path, discarded unconditionally.
pub const STATUS_SEGMENT: &str = "/2/stat/";
/// Marker of topics carrying protobuf service envelopes.
pub const ENVELOPE_MARKER: &str = "/2/e/";
/// Channel name of PKI (direct message) traffic, which the gateway cannot decrypt.
pub const PKI_CHANNEL: &str = "PKI";

/// Whether a received topic may be considered at all.
pub fn is_valid(topic: &str) -> bool {
    !topic.contains(WILDCARD) && !topic.contains(STATUS_SEGMENT)
}

/// Whether the topic carries a protobuf service envelope.
pub fn carries_envelope(topic: &str) -> bool {
    topic.contains(ENVELOPE_MARKER)
}

fn segment_from_end(topic: &str, n: usize) -> Option<&str> {
    let parts: Vec<&str> = topic.split('/').collect();
    parts.len().checked_sub(n).map(|i| parts[i])
}

/// Raw channel segment (second-to-last), used for key lookup.
pub fn channel_segment(topic: &str) -> Option<&str> {
    segment_from_end(topic, 2)
}

/// Display/routing label of the channel: the raw segment, annotated for map
/// reports (`map(MapReport)`) and JSON uplinks (`name(json)`).
pub fn channel_label(topic: &str) -> String {
    let Some(name) = channel_segment(topic) else {
        return String::new();
    };
    if name == "map" {
        format!("{}(MapReport)", name)
    } else if segment_from_end(topic, 3) == Some("json") {
        format!("{}(json)", name)
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_and_status_topics_are_invalid() {
        assert!(!is_valid("msh/TW/2/e/#"));
        assert!(!is_valid("msh/TW/2/stat/!abcd1234"));
        assert!(is_valid("msh/TW/2/e/LongFast/!abcd1234"));
    }

    #[test]
    fn channel_labels() {
        assert_eq!(channel_label("msh/TW/2/e/LongFast/!abcd1234"), "LongFast");
        assert_eq!(channel_label("msh/TW/2/map/!abcd1234"), "map(MapReport)");
        assert_eq!(channel_label("msh/TW/2/json/Work/!abcd1234"), "Work(json)");
        assert_eq!(channel_segment("msh/TW/2/e/PKI/!abcd1234"), Some("PKI"));
        assert_eq!(channel_segment("single"), None);
    }
}
