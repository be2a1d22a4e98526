use crate::api::RelayError;
use crate::postback::InboundRecord;

/// Device identifier fields, in preference order: iOS advertising id,
/// Android advertising id, Android device id, iOS vendor id.
pub const DEVICE_ID_FIELDS: [&str; 4] = ["idfa", "aifa", "andi", "idfv"];

pub const USER_ID_FIELD: &str = "user_id";

/// The identifiers a postback resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityDecision {
    /// Canonical subject identifier for profile and event calls.
    pub distinct_id: String,
    /// Highest-priority device identifier present, independent of whether
    /// a user id exists. The alias call merges this identity into the user
    /// identity; reusing `distinct_id` here would make that merge a no-op.
    pub device_id: Option<String>,
    pub needs_alias: bool,
}

/// Pick the canonical subject identifier: the user id when present,
/// otherwise the first device field in preference order. A record with
/// no identifier at all cannot be forwarded.
pub fn resolve(record: &InboundRecord) -> Result<IdentityDecision, RelayError> {
    let user_id = record.scalar(USER_ID_FIELD);
    let device_id = DEVICE_ID_FIELDS
        .iter()
        .find_map(|field| record.scalar(field));

    let distinct_id = user_id
        .clone()
        .or_else(|| device_id.clone())
        .ok_or(RelayError::NoUserIdentifier)?;

    let needs_alias = user_id.is_some() && device_id.is_some();

    Ok(IdentityDecision {
        distinct_id,
        device_id,
        needs_alias,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_id_wins() {
        let record = InboundRecord::from_value(json!({"user_id": "u1", "idfa": "d1"}));
        let decision = resolve(&record).expect("record has identifiers");

        assert_eq!(decision.distinct_id, "u1");
        assert_eq!(decision.device_id.as_deref(), Some("d1"));
        assert!(decision.needs_alias);
    }

    #[test]
    fn user_id_alone_needs_no_alias() {
        let record = InboundRecord::from_value(json!({"user_id": "u1"}));
        let decision = resolve(&record).expect("record has identifiers");

        assert_eq!(decision.distinct_id, "u1");
        assert_eq!(decision.device_id, None);
        assert!(!decision.needs_alias);
    }

    #[test]
    fn device_fields_resolve_in_preference_order() {
        let record = InboundRecord::from_value(json!({"idfv": "v1", "aifa": "a1"}));
        let decision = resolve(&record).expect("record has identifiers");

        assert_eq!(decision.distinct_id, "a1");
        assert_eq!(decision.device_id.as_deref(), Some("a1"));
        assert!(!decision.needs_alias);
    }

    #[test]
    fn device_id_ignores_user_id() {
        let record =
            InboundRecord::from_value(json!({"user_id": "u1", "andi": "n1", "idfv": "v1"}));
        let decision = resolve(&record).expect("record has identifiers");

        assert_eq!(decision.distinct_id, "u1");
        assert_eq!(decision.device_id.as_deref(), Some("n1"));
        assert!(decision.needs_alias);
    }

    #[test]
    fn no_identifier_is_terminal() {
        let record = InboundRecord::from_value(json!({"campaign": "summer"}));
        let err = resolve(&record).unwrap_err();
        assert!(matches!(err, RelayError::NoUserIdentifier));
    }

    #[test]
    fn empty_identifier_values_are_absent() {
        let record = InboundRecord::from_value(json!({"user_id": "", "idfa": "d1"}));
        let decision = resolve(&record).expect("record has identifiers");

        assert_eq!(decision.distinct_id, "d1");
        assert!(!decision.needs_alias);
    }
}
