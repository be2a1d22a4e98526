use std::time::Duration;

use crate::api::RelayError;
use crate::identity::IdentityDecision;
use crate::postback::CanonicalEvent;
use crate::sink::{Ingest, IngestError};

/// Retry policy for the delivery sequence: a fixed attempt ceiling with a
/// linearly growing wait between attempts.
#[derive(Copy, Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_interval: Duration) -> RetryPolicy {
        RetryPolicy {
            // A ceiling of zero would mean never calling out at all.
            max_attempts: max_attempts.max(1),
            base_interval,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The wait after a failed attempt `n` is `n * base_interval`.
    pub fn retry_interval(&self, attempt: u32) -> Duration {
        self.base_interval * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_interval: Duration::from_secs(1),
        }
    }
}

/// Push one resolved postback to the ingestion platform: alias-merge when
/// the record carried both identities, then a profile overwrite, then the
/// tracked event, in that order. Alias must land before the dependent
/// calls, so the three are awaited sequentially.
///
/// The sequence is treated as a unit: any failing step restarts the whole
/// sequence on the next attempt rather than resuming. Alias and profile
/// writes are overwrites, so re-running them is harmless; a re-run of the
/// track step can duplicate an event. Known limitation.
pub async fn deliver(
    client: &(dyn Ingest + Send + Sync),
    identity: &IdentityDecision,
    event: &CanonicalEvent,
    policy: RetryPolicy,
) -> Result<(), RelayError> {
    let mut attempt = 1;

    loop {
        metrics::counter!("relay_delivery_attempts_total").increment(1);

        match attempt_sequence(client, identity, event).await {
            Ok(()) => {
                metrics::counter!("relay_deliveries_total").increment(1);
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(
                    event = %event.name,
                    distinct_id = %event.distinct_id,
                    attempt,
                    "delivery attempt failed: {}",
                    e
                );

                if attempt >= policy.max_attempts() {
                    metrics::counter!("relay_delivery_failures_total").increment(1);
                    return Err(RelayError::DeliveryFailed {
                        attempts: attempt,
                        cause: e.to_string(),
                    });
                }

                tokio::time::sleep(policy.retry_interval(attempt)).await;
                attempt += 1;
            }
        }
    }
}

async fn attempt_sequence(
    client: &(dyn Ingest + Send + Sync),
    identity: &IdentityDecision,
    event: &CanonicalEvent,
) -> Result<(), IngestError> {
    if identity.needs_alias {
        if let Some(device_id) = &identity.device_id {
            client.alias(device_id, &identity.distinct_id).await?;
        }
    }

    client
        .set_properties(&event.distinct_id, &event.properties)
        .await?;

    client
        .track(&event.distinct_id, &event.name, &event.properties)
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{Map, Value};

    use super::*;

    /// Records every call and fails `set_properties` a scripted number of
    /// times before letting the sequence through.
    struct ScriptedClient {
        calls: Mutex<Vec<String>>,
        failures_left: AtomicUsize,
    }

    impl ScriptedClient {
        fn failing(failures: usize) -> ScriptedClient {
            ScriptedClient {
                calls: Mutex::new(Vec::new()),
                failures_left: AtomicUsize::new(failures),
            }
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Ingest for ScriptedClient {
        async fn alias(&self, _device_id: &str, _user_id: &str) -> Result<(), IngestError> {
            self.record("alias");
            Ok(())
        }

        async fn set_properties(
            &self,
            _distinct_id: &str,
            _properties: &Map<String, Value>,
        ) -> Result<(), IngestError> {
            self.record("set");
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(IngestError::Rejected("scripted failure".to_string()));
            }
            Ok(())
        }

        async fn track(
            &self,
            _distinct_id: &str,
            _event: &str,
            _properties: &Map<String, Value>,
        ) -> Result<(), IngestError> {
            self.record("track");
            Ok(())
        }
    }

    fn identity_with_device() -> IdentityDecision {
        IdentityDecision {
            distinct_id: "u1".to_string(),
            device_id: Some("d1".to_string()),
            needs_alias: true,
        }
    }

    fn event() -> CanonicalEvent {
        CanonicalEvent {
            name: "install".to_string(),
            distinct_id: "u1".to_string(),
            properties: Map::new(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[test]
    fn retry_interval_grows_linearly() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2));
        assert_eq!(policy.retry_interval(1), Duration::from_secs(2));
        assert_eq!(policy.retry_interval(2), Duration::from_secs(4));
        assert_eq!(policy.retry_interval(3), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt_without_surfacing_errors() {
        let client = ScriptedClient::failing(2);

        deliver(&client, &identity_with_device(), &event(), fast_policy())
            .await
            .expect("third attempt should succeed");

        // Every retry restarts from the alias step, never mid-sequence.
        assert_eq!(
            client.calls(),
            vec!["alias", "set", "alias", "set", "alias", "set", "track"]
        );
    }

    #[tokio::test]
    async fn exhausts_the_ceiling_and_reports_delivery_failure() {
        let client = ScriptedClient::failing(usize::MAX);

        let err = deliver(&client, &identity_with_device(), &event(), fast_policy())
            .await
            .unwrap_err();

        match err {
            RelayError::DeliveryFailed { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected a delivery failure, got {:?}", other),
        }
        // Exactly three full sequences were attempted.
        assert_eq!(
            client.calls(),
            vec!["alias", "set", "alias", "set", "alias", "set"]
        );
    }

    #[tokio::test]
    async fn skips_alias_when_not_needed() {
        let client = ScriptedClient::failing(0);
        let identity = IdentityDecision {
            distinct_id: "u1".to_string(),
            device_id: None,
            needs_alias: false,
        };

        deliver(&client, &identity, &event(), fast_policy())
            .await
            .expect("delivery should succeed");

        assert_eq!(client.calls(), vec!["set", "track"]);
    }
}
