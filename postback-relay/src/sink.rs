use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to reach the ingestion endpoint: {0}")]
    Request(#[from] reqwest::Error),
    #[error("call rejected by the ingestion endpoint: {0}")]
    Rejected(String),
}

/// The event-ingestion collaborator. Three operations, each one synchronous
/// request/response; implementations decide the wire format.
#[async_trait]
pub trait Ingest {
    /// Merge a device-scoped identity into a user-scoped identity.
    async fn alias(&self, device_id: &str, user_id: &str) -> Result<(), IngestError>;

    /// Overwrite profile properties under `distinct_id`.
    async fn set_properties(
        &self,
        distinct_id: &str,
        properties: &Map<String, Value>,
    ) -> Result<(), IngestError>;

    /// Append one event record under `distinct_id`.
    async fn track(
        &self,
        distinct_id: &str,
        event: &str,
        properties: &Map<String, Value>,
    ) -> Result<(), IngestError>;
}

/// Mixpanel ingestion API client. All calls go out with `verbose=1` so the
/// response carries a JSON envelope instead of a bare `0`/`1` body.
pub struct MixpanelClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct VerboseResponse {
    status: i64,
    error: Option<String>,
}

impl MixpanelClient {
    pub fn new(
        token: &str,
        base_url: &str,
        request_timeout: Duration,
    ) -> anyhow::Result<MixpanelClient> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("postback-relay")
            .timeout(request_timeout)
            .build()?;

        Ok(MixpanelClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    async fn post(&self, path: &str, payload: Value) -> Result<(), IngestError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .query(&[("verbose", "1")])
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let envelope: VerboseResponse = response.json().await?;
        if envelope.status != 1 {
            return Err(IngestError::Rejected(
                envelope
                    .error
                    .unwrap_or_else(|| "no error detail returned".to_string()),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl Ingest for MixpanelClient {
    async fn alias(&self, device_id: &str, user_id: &str) -> Result<(), IngestError> {
        // Aliasing rides on the track endpoint as a $create_alias event:
        // `alias` is folded into the identity cluster of `distinct_id`.
        let payload = json!([{
            "event": "$create_alias",
            "properties": {
                "distinct_id": user_id,
                "alias": device_id,
                "token": self.token,
            },
        }]);

        self.post("/track", payload).await
    }

    async fn set_properties(
        &self,
        distinct_id: &str,
        properties: &Map<String, Value>,
    ) -> Result<(), IngestError> {
        let payload = json!([{
            "$token": self.token,
            "$distinct_id": distinct_id,
            "$set": properties,
        }]);

        self.post("/engage", payload).await
    }

    async fn track(
        &self,
        distinct_id: &str,
        event: &str,
        properties: &Map<String, Value>,
    ) -> Result<(), IngestError> {
        let mut properties = properties.clone();
        properties.insert("token".to_string(), Value::String(self.token.clone()));
        properties.insert(
            "distinct_id".to_string(),
            Value::String(distinct_id.to_string()),
        );
        if !properties.contains_key("$insert_id") {
            properties.insert(
                "$insert_id".to_string(),
                Value::String(Uuid::now_v7().to_string()),
            );
        }
        if !properties.contains_key("time") {
            properties.insert(
                "time".to_string(),
                Value::from(time::OffsetDateTime::now_utc().unix_timestamp()),
            );
        }

        let payload = json!([{
            "event": event,
            "properties": properties,
        }]);

        self.post("/track", payload).await
    }
}
