use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::classify::flag_is_one;
use crate::postback::InboundRecord;

/// Provider field name → canonical property name. Process-wide, read-only;
/// iteration order is the table order, so mapping output is deterministic.
pub const FIELD_MAPPINGS: &[(&str, &str)] = &[
    ("campaign", "mp_campaign"),
    ("campaign_id", "mp_campaign_id"),
    ("network", "mp_network"),
    ("site", "mp_site"),
    ("tracker", "mp_tracker"),
    ("platform", "mp_platform"),
    ("os", "mp_os"),
    ("os_version", "mp_os_version"),
    ("device", "mp_device"),
    ("country", "mp_country"),
    ("city", "mp_city"),
    ("app_id", "mp_app_id"),
    ("app_name", "mp_app_name"),
    ("app_version", "mp_app_version"),
    ("user_id", "user_id"),
    ("idfa", "idfa"),
    ("aifa", "aifa"),
    ("andi", "andi"),
    ("idfv", "idfv"),
];

/// Install timestamp, Unix epoch seconds on the wire.
pub const INSTALL_TS_FIELD: &str = "install_ts";
pub const INSTALL_TIME_KEY: &str = "install_time";

/// View-through attribution flag.
pub const VIEWTHROUGH_FLAG_FIELD: &str = "is_viewthrough";
pub const ATTRIBUTION_TOUCH_KEY: &str = "attribution_touch";

/// Prefix for provider fields that have no canonical name, so they survive
/// without polluting the canonical namespace.
pub const PROVIDER_PREFIX: &str = "singular_";

pub const ATTRIBUTION_SOURCE_KEY: &str = "$attribution_source";
pub const ATTRIBUTION_SOURCE: &str = "singular";
pub const ATTRIBUTION_TIME_KEY: &str = "$attribution_time";

/// Project a postback record into analytics properties.
///
/// Pure function of the record and the supplied timestamp: absent optional
/// fields are omitted, nothing here can fail, and the record is never
/// mutated.
pub fn map_properties(record: &InboundRecord, now: &str) -> Map<String, Value> {
    let mut properties = Map::new();

    for (source, canonical) in FIELD_MAPPINGS {
        match record.get(source) {
            Some(Value::Null) | None => {}
            Some(value) => {
                properties.insert((*canonical).to_string(), value.clone());
            }
        }
    }

    if let Some(instant) = record.get(INSTALL_TS_FIELD).and_then(epoch_seconds) {
        if let Some(formatted) = format_epoch(instant) {
            properties.insert(INSTALL_TIME_KEY.to_string(), Value::String(formatted));
        }
    }

    if let Some(flag) = record.get(VIEWTHROUGH_FLAG_FIELD) {
        let touch = if flag_is_one(Some(flag)) { "view" } else { "click" };
        properties.insert(
            ATTRIBUTION_TOUCH_KEY.to_string(),
            Value::String(touch.to_string()),
        );
    }

    for (key, value) in record.iter() {
        if is_mapped_source(key) || key == INSTALL_TS_FIELD || key == VIEWTHROUGH_FLAG_FIELD {
            continue;
        }
        properties.insert(format!("{}{}", PROVIDER_PREFIX, key), value.clone());
    }

    properties.insert(
        ATTRIBUTION_SOURCE_KEY.to_string(),
        Value::String(ATTRIBUTION_SOURCE.to_string()),
    );
    properties.insert(
        ATTRIBUTION_TIME_KEY.to_string(),
        Value::String(now.to_string()),
    );

    properties
}

fn is_mapped_source(key: &str) -> bool {
    FIELD_MAPPINGS.iter().any(|(source, _)| *source == key)
}

fn epoch_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
}

fn format_epoch(seconds: i64) -> Option<String> {
    let instant = OffsetDateTime::from_unix_timestamp(seconds).ok()?;
    instant.format(&Rfc3339).ok()
}
