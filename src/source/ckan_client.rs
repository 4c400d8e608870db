use crate::config::SourceSettings;
use crate::source::error::SourceFetchError;
use crate::source::record::RawRecord;
use crate::source::snapshot::ObservationSource;
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;

/// Largest page the CKAN datastore serves in one `datastore_search` call.
pub const MAX_PAGE_SIZE: usize = 32_000;

#[derive(Debug, Deserialize)]
struct DatastoreResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<DatastoreResult>,
}

#[derive(Debug, Default, Deserialize)]
struct DatastoreResult {
    #[serde(default)]
    records: Vec<RawRecord>,
    #[serde(default)]
    total: Option<u64>,
}

/// Tracks limit/offset pagination against the server-reported total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageCursor {
    offset: usize,
    batch: usize,
    total: Option<u64>,
}

impl PageCursor {
    fn new(batch: usize) -> Self {
        Self {
            offset: 0,
            batch: batch.clamp(1, MAX_PAGE_SIZE),
            total: None,
        }
    }

    /// Records a received page. Returns `true` while more pages remain.
    /// The total is taken from the first page that reports one.
    fn advance(&mut self, received: usize, reported_total: Option<u64>) -> bool {
        if self.total.is_none() {
            self.total = reported_total;
        }
        if received == 0 {
            return false;
        }
        self.offset += self.batch;
        match self.total {
            Some(total) => (self.offset as u64) < total,
            None => true,
        }
    }
}

/// Client for the CKAN `datastore_search` endpoint of the open-data portal.
///
/// Each resource is downloaded completely, page by page; a resource that yields no
/// rows at all is reported as [`SourceFetchError::NoRecords`].
pub struct CkanClient {
    client: Client,
    settings: SourceSettings,
}

impl CkanClient {
    pub fn new(settings: SourceSettings) -> Result<Self, SourceFetchError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(SourceFetchError::ClientBuild)?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    /// Downloads every row of `resource_id`, `batch` rows per request.
    pub async fn fetch_all(
        &self,
        resource_id: &str,
        batch: usize,
    ) -> Result<Vec<RawRecord>, SourceFetchError> {
        let mut cursor = PageCursor::new(batch);
        let mut records = Vec::new();

        loop {
            let page = self.fetch_page(resource_id, cursor.batch, cursor.offset).await?;
            let received = page.records.len();
            debug!(
                "Resource {}: {} rows at offset {} (total {:?})",
                resource_id, received, cursor.offset, page.total
            );
            records.extend(page.records);
            if !cursor.advance(received, page.total) {
                break;
            }
        }

        if records.is_empty() {
            warn!("Resource {} returned no records", resource_id);
            return Err(SourceFetchError::NoRecords(resource_id.to_string()));
        }
        info!("Fetched {} rows from resource {}", records.len(), resource_id);
        Ok(records)
    }

    async fn fetch_page(
        &self,
        resource_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<DatastoreResult, SourceFetchError> {
        let url = &self.settings.base_url;
        let response = self
            .client
            .get(url)
            .query(&[
                ("resource_id", resource_id.to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
                ("include_total", "true".to_string()),
            ])
            .send()
            .await
            .map_err(|e| SourceFetchError::NetworkRequest(url.clone(), e))?;

        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                warn!("HTTP error for {} ({}): {:?}", url, resource_id, e);
                return Err(if let Some(status) = e.status() {
                    SourceFetchError::HttpStatus {
                        url: url.clone(),
                        status,
                        source: e,
                    }
                } else {
                    SourceFetchError::NetworkRequest(url.clone(), e)
                });
            }
        };

        let payload: DatastoreResponse =
            response
                .json()
                .await
                .map_err(|e| SourceFetchError::InvalidPayload {
                    resource: resource_id.to_string(),
                    source: e,
                })?;
        unwrap_payload(resource_id, payload)
    }
}

fn unwrap_payload(
    resource_id: &str,
    payload: DatastoreResponse,
) -> Result<DatastoreResult, SourceFetchError> {
    if !payload.success {
        return Err(SourceFetchError::Unsuccessful(resource_id.to_string()));
    }
    Ok(payload.result.unwrap_or_default())
}

#[async_trait]
impl ObservationSource for CkanClient {
    async fn abbreviations(&self) -> Result<Vec<RawRecord>, SourceFetchError> {
        self.fetch_all(
            &self.settings.abbreviations_resource,
            self.settings.abbreviation_batch,
        )
        .await
    }

    async fn stations(&self) -> Result<Vec<RawRecord>, SourceFetchError> {
        self.fetch_all(&self.settings.stations_resource, self.settings.station_batch)
            .await
    }

    async fn observations(&self) -> Result<Vec<RawRecord>, SourceFetchError> {
        self.fetch_all(
            &self.settings.observations_resource,
            self.settings.observation_batch,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cursor_stops_at_reported_total() {
        let mut cursor = PageCursor::new(100);
        assert!(cursor.advance(100, Some(250)));
        assert_eq!(cursor.offset, 100);
        assert!(cursor.advance(100, Some(999)));
        assert_eq!(cursor.total, Some(250));
        assert!(!cursor.advance(50, None));
        assert_eq!(cursor.offset, 300);
    }

    #[test]
    fn test_cursor_stops_on_empty_page_without_total() {
        let mut cursor = PageCursor::new(10);
        assert!(cursor.advance(10, None));
        assert!(cursor.advance(10, None));
        assert!(!cursor.advance(0, None));
        assert_eq!(cursor.offset, 20);
    }

    #[test]
    fn test_cursor_clamps_batch() {
        assert_eq!(PageCursor::new(0).batch, 1);
        assert_eq!(PageCursor::new(50_000).batch, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_unwrap_payload() -> Result<(), Box<dyn std::error::Error>> {
        let ok: DatastoreResponse = serde_json::from_value(json!({
            "success": true,
            "result": {
                "records": [{"STATION_ID": "A", "VALUE": "1,5"}],
                "total": 1
            }
        }))?;
        let result = unwrap_payload("res", ok)?;
        assert_eq!(result.total, Some(1));
        assert_eq!(result.records[0].number("VALUE"), Some(1.5));

        let missing_result: DatastoreResponse = serde_json::from_value(json!({"success": true}))?;
        assert!(unwrap_payload("res", missing_result)?.records.is_empty());

        let failed: DatastoreResponse =
            serde_json::from_value(json!({"success": false, "error": {"message": "nope"}}))?;
        assert!(matches!(
            unwrap_payload("res", failed),
            Err(SourceFetchError::Unsuccessful(r)) if r == "res"
        ));
        Ok(())
    }
}
