use axum::extract::{RawQuery, State};
use axum::Json;
use bytes::Bytes;
use metrics::counter;
use tracing::instrument;

use crate::api::{RelayError, RelayResponse};
use crate::classify::classify;
use crate::deliver::deliver;
use crate::identity;
use crate::postback::{CanonicalEvent, InboundRecord};
use crate::properties::map_properties;
use crate::router;

/// Handle one provider postback: extract the record, resolve identity,
/// classify and project, then push the result to the ingestion platform.
#[instrument(skip_all, fields(event, distinct_id, campaign, network))]
pub async fn postback(
    state: State<router::State>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Json<RelayResponse>, RelayError> {
    counter!("relay_postbacks_received_total").increment(1);

    let record = InboundRecord::from_request(query.as_deref(), &body).map_err(reject)?;
    let identity = identity::resolve(&record).map_err(reject)?;

    let name = classify(&record);
    let properties = map_properties(&record, &state.timesource.current_time());

    let span = tracing::Span::current();
    span.record("event", name.as_str());
    span.record("distinct_id", identity.distinct_id.as_str());
    if let Some(campaign) = record.scalar("campaign") {
        span.record("campaign", campaign.as_str());
    }
    if let Some(network) = record.scalar("network") {
        span.record("network", network.as_str());
    }

    let event = CanonicalEvent {
        name,
        distinct_id: identity.distinct_id.clone(),
        properties,
    };

    // Configuration is checked before the first outbound call is made.
    let Some(client) = &state.client else {
        tracing::error!("no ingestion credential configured, dropping postback");
        return Err(RelayError::MissingCredential);
    };

    deliver(client.as_ref(), &identity, &event, state.retry).await?;

    tracing::debug!(event = %event.name, "postback delivered");

    Ok(Json(RelayResponse {
        success: true,
        event: event.name,
        distinct_id: identity.distinct_id,
        aliased: identity.needs_alias,
    }))
}

fn reject(err: RelayError) -> RelayError {
    counter!("relay_postbacks_rejected_total").increment(1);
    tracing::warn!("rejected postback: {}", err);
    err
}
