use serde_json::Value;

use crate::postback::InboundRecord;

pub const EVENT_NAME_FIELD: &str = "event_name";
pub const REENGAGEMENT_FLAG_FIELD: &str = "is_reengagement";

/// The provider's session-start sentinel. Matched case-insensitively.
const SESSION_START: &str = "__start__";
/// The provider's login sentinel. Matched exactly: the provider's own
/// mapping table compares this one name case-sensitively, and downstream
/// dashboards depend on the resulting split, so we reproduce it.
const LOGIN_COMPLETED: &str = "login_completed_event";

pub const EVENT_INSTALL: &str = "install";
pub const EVENT_REENGAGEMENT: &str = "reengagement";
pub const EVENT_ATTRIBUTION_RECEIVED: &str = "attribution_received";
pub const EVENT_UNKNOWN: &str = "unknown_event";

/// Map the provider's raw event name to the canonical name tracked on the
/// analytics side. Unrecognized names pass through verbatim.
pub fn classify(record: &InboundRecord) -> String {
    let raw = match record.get(EVENT_NAME_FIELD) {
        Some(Value::String(name)) if !name.is_empty() => name,
        _ => return EVENT_UNKNOWN.to_string(),
    };

    if raw.eq_ignore_ascii_case(SESSION_START) {
        return if flag_is_one(record.get(REENGAGEMENT_FLAG_FIELD)) {
            EVENT_REENGAGEMENT.to_string()
        } else {
            EVENT_INSTALL.to_string()
        };
    }

    if raw == LOGIN_COMPLETED {
        return EVENT_ATTRIBUTION_RECEIVED.to_string();
    }

    raw.clone()
}

/// Strict equality against the number 1. `0`, strings, absence and
/// anything else all read as unset.
pub fn flag_is_one(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Number(n)) if n.as_i64() == Some(1))
}
