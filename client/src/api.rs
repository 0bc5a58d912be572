use std::future::Future;

use photon_shared::{
    ActiveRoute, HistoryPoint, LinkRegistry, LiveLinks, LiveLinksUpdate, RouteActivation,
    RouteActivationResponse, RouteLive, RoutePlan, RoutePlanRequest, TelemetryFrame,
};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Remote state the engine polls and drives.
///
/// Futures are not required to be `Send`; the engine runs them on a
/// single-threaded local set.
pub trait Backend {
    fn fetch_telemetry(
        &self,
        include_coordinates: bool,
    ) -> impl Future<Output = Result<TelemetryFrame, ClientError>>;

    fn fetch_registry(&self) -> impl Future<Output = Result<LinkRegistry, ClientError>>;

    fn fetch_live_links(&self) -> impl Future<Output = Result<LiveLinks, ClientError>>;

    fn update_live_links(
        &self,
        update: LiveLinksUpdate,
    ) -> impl Future<Output = Result<LiveLinks, ClientError>>;

    fn plan_route(
        &self,
        request: RoutePlanRequest,
    ) -> impl Future<Output = Result<RoutePlan, ClientError>>;

    fn activate_route(
        &self,
        request: RouteActivation,
    ) -> impl Future<Output = Result<ActiveRoute, ClientError>>;

    fn fetch_route_live(&self) -> impl Future<Output = Result<RouteLive, ClientError>>;

    fn fetch_history(&self) -> impl Future<Output = Result<Vec<HistoryPoint>, ClientError>>;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .user_agent("photon-client/0.1")
            .timeout(config.http_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self::with_client(client, &config.api_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let resp = request.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                detail: error_detail(&bytes),
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Extracts the `detail` of an error body, if any.
fn error_detail(body: &[u8]) -> String {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return String::new();
    };
    match value.get("detail") {
        Some(serde_json::Value::String(detail)) => detail.trim().to_string(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

impl Backend for HttpBackend {
    async fn fetch_telemetry(
        &self,
        include_coordinates: bool,
    ) -> Result<TelemetryFrame, ClientError> {
        let request = self
            .client
            .get(self.url("/live"))
            .query(&[("include_coordinates", include_coordinates)]);
        self.send_json(request).await
    }

    async fn fetch_registry(&self) -> Result<LinkRegistry, ClientError> {
        self.send_json(self.client.get(self.url("/admin/links"))).await
    }

    async fn fetch_live_links(&self) -> Result<LiveLinks, ClientError> {
        self.send_json(self.client.get(self.url("/admin/live-links"))).await
    }

    async fn update_live_links(&self, update: LiveLinksUpdate) -> Result<LiveLinks, ClientError> {
        let request = self.client.post(self.url("/admin/live-links")).json(&update);
        self.send_json(request).await
    }

    async fn plan_route(&self, request: RoutePlanRequest) -> Result<RoutePlan, ClientError> {
        let request = self.client.post(self.url("/route/plan")).json(&request);
        self.send_json(request).await
    }

    async fn activate_route(&self, request: RouteActivation) -> Result<ActiveRoute, ClientError> {
        let request = self.client.post(self.url("/route/activate")).json(&request);
        let resp: RouteActivationResponse = self.send_json(request).await?;
        Ok(resp.route)
    }

    async fn fetch_route_live(&self) -> Result<RouteLive, ClientError> {
        self.send_json(self.client.get(self.url("/route/live"))).await
    }

    async fn fetch_history(&self) -> Result<Vec<HistoryPoint>, ClientError> {
        self.send_json(self.client.get(self.url("/stats/history"))).await
    }
}
