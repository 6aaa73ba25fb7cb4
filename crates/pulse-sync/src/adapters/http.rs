//! REST adapter for the dashboard's pull endpoints and scrape commands.

use async_trait::async_trait;
use pulse_types::{
    CommandAck, HealthReport, ResourceKey, ResourceKind, RestaurantSummary, ScrapeCommand,
    ScrapingStatus,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::error::{ConfigError, FetchError};
use crate::ports::DashboardApi;

/// [`DashboardApi`] over HTTP.
pub struct HttpDashboardApi {
    client: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpDashboardApi {
    /// # Errors
    ///
    /// `ConfigError::Invalid` if the base URL cannot carry paths or the HTTP
    /// client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ConfigError::Invalid(format!("api.base_url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "api.base_url cannot carry paths: {base_url}"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            request_timeout: config.request_timeout,
        })
    }

    /// Base URL joined with percent-encoded path segments.
    pub fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.request_timeout)
        } else {
            FetchError::Network(err.to_string())
        }
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<Value, FetchError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        check_rejected(&body)?;
        Ok(body)
    }
}

#[async_trait]
impl DashboardApi for HttpDashboardApi {
    async fn fetch(&self, key: &ResourceKey) -> Result<Value, FetchError> {
        let url = self.endpoint(key.path_segments());
        debug!(key = %key, url = %url, "GET");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let body = self.read_body(response).await?;
        check_shape(key.kind(), &body)?;
        Ok(body)
    }

    async fn execute(&self, command: ScrapeCommand) -> Result<CommandAck, FetchError> {
        let url = self.endpoint(command.path_segments());
        debug!(command = %command, url = %url, "POST");

        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let body = self.read_body(response).await?;
        CommandAck::deserialize(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

/// A success status with an `{"error": ...}` body is a rejection.
fn check_rejected(body: &Value) -> Result<(), FetchError> {
    match body.get("error").and_then(Value::as_str) {
        Some(error) => Err(FetchError::Rejected(error.to_string())),
        None => Ok(()),
    }
}

fn check_shape(kind: ResourceKind, body: &Value) -> Result<(), FetchError> {
    match kind {
        ResourceKind::RestaurantList => decode::<Vec<RestaurantSummary>>(body),
        ResourceKind::Status => decode::<ScrapingStatus>(body),
        ResourceKind::Health => decode::<HealthReport>(body),
        ResourceKind::RestaurantDetail | ResourceKind::Analytics | ResourceKind::Trends => {
            if body.is_object() {
                Ok(())
            } else {
                Err(FetchError::Decode(format!("expected object for {kind:?}")))
            }
        }
    }
}

fn decode<T: DeserializeOwned>(body: &Value) -> Result<(), FetchError> {
    T::deserialize(body)
        .map(|_| ())
        .map_err(|e| FetchError::Decode(e.to_string()))
}
