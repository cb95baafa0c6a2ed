//! Keep/drop decision for inbound payloads.

use std::fmt;

use serde_json::Value;
use tracing::{debug, warn};

/// Field a CDC connector sets to `true` on delete events
/// (Debezium's `ExtractNewRecordState` with `delete.handling.mode=rewrite`).
pub const DELETED_FIELD: &str = "__deleted";

/// Number of characters of a malformed payload that get logged.
const LOG_PREFIX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DropReason {
    /// Empty or whitespace-only payload
    Empty,
    /// Not valid UTF-8 JSON
    Malformed,
    /// Delete event
    Tombstone,
    /// Topic has no destination table
    UnknownTopic,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Empty => "empty",
            DropReason::Malformed => "malformed",
            DropReason::Tombstone => "tombstone",
            DropReason::UnknownTopic => "unknown_topic",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`RecordFilter::should_keep`].
///
/// A kept payload is handed back as the original text, never re-serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision<'a> {
    Keep(&'a str),
    Drop(DropReason),
}

impl FilterDecision<'_> {
    pub fn is_keep(&self) -> bool {
        matches!(self, FilterDecision::Keep(_))
    }
}

/// Stateless payload filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFilter;

impl RecordFilter {
    pub fn new() -> Self {
        Self
    }

    /// Decide whether `payload` should be stored.
    ///
    /// Checks run in a fixed order: emptiness, then JSON validity, then the
    /// deletion marker. A payload that fails to parse is never inspected for
    /// the marker.
    pub fn should_keep<'a>(&self, payload: &'a [u8]) -> FilterDecision<'a> {
        if payload.is_empty() {
            return FilterDecision::Drop(DropReason::Empty);
        }

        let text = match std::str::from_utf8(payload) {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    "Dropping payload that is not valid UTF-8 ({e}): {}...",
                    String::from_utf8_lossy(&payload[..payload.len().min(LOG_PREFIX_CHARS)])
                );
                return FilterDecision::Drop(DropReason::Malformed);
            }
        };

        if text.trim().is_empty() {
            return FilterDecision::Drop(DropReason::Empty);
        }

        let parsed: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!("Invalid JSON in message ({e}): {}...", log_prefix(text));
                return FilterDecision::Drop(DropReason::Malformed);
            }
        };

        if is_tombstone(&parsed) {
            debug!("Skipping delete event");
            return FilterDecision::Drop(DropReason::Tombstone);
        }

        FilterDecision::Keep(text)
    }
}

/// Only a literal boolean `true` counts; `"true"` or `1` do not.
fn is_tombstone(value: &Value) -> bool {
    matches!(value.get(DELETED_FIELD), Some(Value::Bool(true)))
}

fn log_prefix(text: &str) -> String {
    text.chars().take(LOG_PREFIX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decide(payload: &str) -> FilterDecision<'_> {
        RecordFilter::new().should_keep(payload.as_bytes())
    }

    #[test]
    fn test_empty_and_whitespace_dropped() {
        assert_eq!(decide(""), FilterDecision::Drop(DropReason::Empty));
        assert_eq!(decide("   "), FilterDecision::Drop(DropReason::Empty));
        assert_eq!(decide("\n\t \r\n"), FilterDecision::Drop(DropReason::Empty));
    }

    #[test]
    fn test_malformed_dropped() {
        for payload in ["{", "not json", "{\"a\": }", "{\"__deleted\": true", "[1, 2,"] {
            assert_eq!(
                decide(payload),
                FilterDecision::Drop(DropReason::Malformed),
                "payload: {payload}"
            );
        }
    }

    #[test]
    fn test_invalid_utf8_dropped() {
        let payload = [0x7b, 0xff, 0xfe, 0x7d];
        assert_eq!(
            RecordFilter::new().should_keep(&payload),
            FilterDecision::Drop(DropReason::Malformed)
        );
    }

    #[test]
    fn test_tombstone_dropped_regardless_of_other_fields() {
        assert_eq!(
            decide(r#"{"__deleted": true}"#),
            FilterDecision::Drop(DropReason::Tombstone)
        );
        assert_eq!(
            decide(r#"{"_id": "65f0", "name": "Ada", "total": 12.5, "__deleted": true}"#),
            FilterDecision::Drop(DropReason::Tombstone)
        );
    }

    #[test]
    fn test_deleted_marker_must_be_boolean_true() {
        for payload in [
            r#"{"__deleted": false}"#,
            r#"{"__deleted": "true"}"#,
            r#"{"__deleted": 1}"#,
            r#"{"__deleted": null}"#,
            r#"{"payload": {"__deleted": true}}"#,
        ] {
            assert!(decide(payload).is_keep(), "payload: {payload}");
        }
    }

    #[test]
    fn test_kept_payload_is_passed_through_unmodified() {
        // Formatting and number precision must survive untouched
        let payload = "{ \"price\" : 19.990000000000001,\n  \"qty\": 3 }";
        assert_eq!(decide(payload), FilterDecision::Keep(payload));
    }

    #[test]
    fn test_non_object_json_is_kept() {
        assert!(decide("[1, 2, 3]").is_keep());
        assert!(decide("42").is_keep());
        assert!(decide("\"text\"").is_keep());
    }

    #[test]
    fn test_log_prefix_is_bounded_and_char_safe() {
        let long = "é".repeat(500);
        let prefix = log_prefix(&long);
        assert_eq!(prefix.chars().count(), LOG_PREFIX_CHARS);
    }
}
