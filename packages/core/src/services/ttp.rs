//! HTTP client for the appointment scheduler API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::slots::{FetchError, RawSlot, SlotFetcher};

/// Most slots requested per location in one call.
const SLOT_LIMIT: u32 = 500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct TtpClient {
    base_url: String,
    http: Client,
}

/// One record of the `/slots` listing. Everything is optional: the filter
/// decides what to do with incomplete records.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRecord {
    pub location_id: Option<u32>,
    pub start_timestamp: Option<String>,
    pub end_timestamp: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub duration: Option<u32>,
}

fn default_active() -> bool {
    true
}

impl TtpClient {
    pub fn new(base_url: String) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| FetchError::network(err.to_string()))?;
        Ok(Self::with_client(base_url, http))
    }

    pub fn with_client(base_url: String, http: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn slots_url(&self, location_id: u32) -> String {
        format!(
            "{}/slots?orderBy=soonest&limit={}&locationId={}&minimum=1",
            self.base_url, SLOT_LIMIT, location_id
        )
    }

    async fn fetch_records(&self, location_id: u32) -> Result<Vec<SlotRecord>, FetchError> {
        let response = self
            .http
            .get(self.slots_url(location_id))
            .send()
            .await
            .map_err(|err| FetchError::network(err.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
            });
        }

        response
            .json::<Vec<SlotRecord>>()
            .await
            .map_err(|err| FetchError::format(err.to_string()))
    }
}

#[async_trait]
impl SlotFetcher for TtpClient {
    async fn fetch(&self, location_id: u32) -> Result<Vec<RawSlot>, FetchError> {
        let records = self.fetch_records(location_id).await?;
        let total = records.len();

        // Inactive slots are listed but not bookable.
        let slots: Vec<RawSlot> = records
            .into_iter()
            .filter(|record| record.active)
            .map(|record| RawSlot {
                location_id: record.location_id.unwrap_or(location_id),
                start_timestamp: record.start_timestamp,
            })
            .collect();

        tracing::debug!(
            location_id,
            total,
            active = slots.len(),
            "Fetched appointment slots"
        );

        Ok(slots)
    }

    fn fetcher_name(&self) -> &str {
        "ttp-scheduler-api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    const FAKE_SLOTS: &str = r#"[
        {"locationId": 5140, "startTimestamp": "2024-03-01T08:00", "endTimestamp": "2024-03-01T08:15", "active": true, "duration": 15},
        {"locationId": 5140, "startTimestamp": "2024-03-01T08:15", "endTimestamp": "2024-03-01T08:30", "active": false, "duration": 15},
        {"locationId": 5140, "active": true, "duration": 15}
    ]"#;

    async fn client_for(server: &MockServer) -> TtpClient {
        TtpClient::new(format!("{}/", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn fetch_returns_active_records_for_location() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slots"))
            .and(query_param("locationId", "5140"))
            .and(query_param("orderBy", "soonest"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(FAKE_SLOTS, "application/json"))
            .mount(&server)
            .await;

        let slots = client_for(&server).await.fetch(5140).await.unwrap();

        assert_eq!(
            slots,
            vec![
                RawSlot::new(5140, "2024-03-01T08:00"),
                RawSlot::missing_time(5140),
            ]
        );
    }

    #[tokio::test]
    async fn empty_listing_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slots"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("[]", "application/json"))
            .mount(&server)
            .await;

        let slots = client_for(&server).await.fetch(1).await.unwrap();
        assert!(slots.is_empty());
    }

    #[tokio::test]
    async fn http_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client_for(&server).await.fetch(1).await.unwrap_err();
        assert_eq!(err, FetchError::Status { status: 403 });
    }

    #[tokio::test]
    async fn unexpected_body_is_format_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{\"oops\": 1}", "application/json"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.fetch(1).await.unwrap_err();
        assert!(matches!(err, FetchError::Format { .. }));
    }

    #[test]
    fn slots_url_has_expected_query() {
        let client = TtpClient::with_client("https://example.com/api/".into(), Client::new());
        assert_eq!(
            client.slots_url(42),
            "https://example.com/api/slots?orderBy=soonest&limit=500&locationId=42&minimum=1"
        );
    }
}
