//! HTTP + WebSocket client for the hosted `trafego-server`.
//!
//! Rows are read and written through the JSON routes; the realtime feed is a
//! WebSocket per subscription carrying one JSON [`ChangeEvent`] per text
//! frame. The server scopes every route to the user behind the API key, so
//! `owner` arguments are only checked against the session here.

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::{SinkExt, StreamExt};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

use super::{
    AuthSession, BackendError, BackendResult, DashboardStore, Subscription, ToolStore,
};
use crate::analysis::{AnalysisError, CampaignAnalyzer};
use crate::models::{
    AnalysisSummary, ChangeEvent, DailyMetric, Product, SavedAnalysis, ToolRecord, User, UserId,
};

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct HasMetricsResponse {
    has_metrics: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest<'a> {
    campaign_data: &'a str,
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    analysis: String,
}

/// Client for a remote server, authenticated with an API key.
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    server_url: String,
    api_key: String,
    client: reqwest::Client,
    user: Option<User>,
}

impl RemoteBackend {
    /// Creates a client without contacting the server.
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            user: None,
        }
    }

    /// Creates a client and resolves the session through `/me`.
    pub async fn connect(
        server_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> BackendResult<Self> {
        let mut backend = Self::new(server_url, api_key);
        let user: User = backend.get_json("/me").await?;
        tracing::debug!("[remote] signed in as {}", user.id);
        backend.user = Some(user);
        Ok(backend)
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    fn build_http_url(&self, path: &str) -> String {
        let base_url = if self.server_url.starts_with("ws://") {
            self.server_url.replace("ws://", "http://")
        } else if self.server_url.starts_with("wss://") {
            self.server_url.replace("wss://", "https://")
        } else if !self.server_url.starts_with("http://")
            && !self.server_url.starts_with("https://")
        {
            format!("http://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!("{}{}", base_url.trim_end_matches('/'), path)
    }

    fn build_ws_url(&self) -> String {
        let base_url = if self.server_url.starts_with("http://") {
            self.server_url.replace("http://", "ws://")
        } else if self.server_url.starts_with("https://") {
            self.server_url.replace("https://", "wss://")
        } else if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://")
        {
            format!("ws://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!(
            "{}/realtime?key={}",
            base_url.trim_end_matches('/'),
            urlencoding::encode(&self.api_key)
        )
    }

    fn tool_path(tool_name: &str) -> String {
        format!("/tools/{}", urlencoding::encode(tool_name))
    }

    fn ensure_owner(&self, owner: &UserId) -> BackendResult<()> {
        match &self.user {
            Some(user) if &user.id == owner => Ok(()),
            Some(_) => Err(BackendError::Status {
                status: 403,
                message: format!("session cannot access rows of {}", owner),
            }),
            None => Err(BackendError::NoSession),
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.build_http_url(path))
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> BackendResult<T> {
        let response = self
            .request(Method::GET, path)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;
        read_json(response).await
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> BackendResult<T> {
        let response = self
            .request(method, path)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;
        read_json(response).await
    }

    async fn delete(&self, path: &str) -> BackendResult<()> {
        let response = self
            .request(Method::DELETE, path)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;
        check_status(response).await.map(|_| ())
    }
}

async fn check_status(response: reqwest::Response) -> BackendResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or(body);

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(BackendError::NotFound(message));
    }
    if status == reqwest::StatusCode::CONFLICT {
        return Err(BackendError::Conflict(message));
    }
    Err(BackendError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> BackendResult<T> {
    check_status(response)
        .await?
        .json()
        .await
        .map_err(|e| BackendError::Http(e.to_string()))
}

impl AuthSession for RemoteBackend {
    fn current_user(&self) -> Option<User> {
        self.user.clone()
    }
}

#[async_trait]
impl ToolStore for RemoteBackend {
    async fn select_tool_records(
        &self,
        owner: &UserId,
        tool_name: &str,
        limit: usize,
    ) -> BackendResult<Vec<ToolRecord>> {
        self.ensure_owner(owner)?;
        let path = format!("{}?limit={}", Self::tool_path(tool_name), limit);
        self.get_json(&path).await
    }

    async fn upsert_tool_record(&self, record: &ToolRecord) -> BackendResult<ToolRecord> {
        self.ensure_owner(&record.owner_id)?;
        self.send_json(Method::PUT, &Self::tool_path(&record.tool_name), record)
            .await
    }

    async fn subscribe(&self, owner: &UserId, topic: &str) -> BackendResult<Subscription> {
        self.ensure_owner(owner)?;

        let (ws_stream, _) = connect_async(self.build_ws_url())
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        let (mut sender, receiver) = ws_stream.split();
        tracing::debug!("[remote] realtime channel {} connected", topic);

        let topic_name = topic.to_string();
        let events = receiver
            .take_while(|message| {
                futures::future::ready(matches!(message, Ok(m) if !m.is_close()))
            })
            .filter_map(move |message| {
                let topic = topic_name.clone();
                async move {
                    match message {
                        Ok(Message::Text(text)) => {
                            match serde_json::from_str::<ChangeEvent>(text.as_str()) {
                                Ok(event) => Some(event),
                                Err(e) => {
                                    tracing::warn!("[realtime] {} bad frame: {}", topic, e);
                                    None
                                }
                            }
                        }
                        _ => None,
                    }
                }
            });

        Ok(
            Subscription::new(topic, events.boxed()).with_close_hook(move || {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        let _ = sender.send(Message::Close(None)).await;
                    });
                }
            }),
        )
    }
}

#[async_trait]
impl DashboardStore for RemoteBackend {
    async fn list_products(&self, owner: &UserId) -> BackendResult<Vec<Product>> {
        self.ensure_owner(owner)?;
        self.get_json("/products").await
    }

    async fn insert_product(&self, product: &Product) -> BackendResult<Product> {
        self.ensure_owner(&product.owner_id)?;
        self.send_json(Method::POST, "/products", product).await
    }

    async fn delete_product(&self, owner: &UserId, id: Uuid) -> BackendResult<()> {
        self.ensure_owner(owner)?;
        self.delete(&format!("/products/{}", id)).await
    }

    async fn product_has_metrics(&self, owner: &UserId, id: Uuid) -> BackendResult<bool> {
        self.ensure_owner(owner)?;
        let response: HasMetricsResponse = self
            .get_json(&format!("/products/{}/has-metrics", id))
            .await?;
        Ok(response.has_metrics)
    }

    async fn select_daily_metrics(
        &self,
        owner: &UserId,
        product_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BackendResult<Vec<DailyMetric>> {
        self.ensure_owner(owner)?;
        let path = format!(
            "/metrics?product_id={}&from={}&to={}",
            product_id,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );
        self.get_json(&path).await
    }

    async fn upsert_daily_metric(&self, metric: &DailyMetric) -> BackendResult<DailyMetric> {
        self.ensure_owner(&metric.owner_id)?;
        self.send_json(Method::PUT, "/metrics", metric).await
    }

    async fn list_analyses(&self, owner: &UserId) -> BackendResult<Vec<AnalysisSummary>> {
        self.ensure_owner(owner)?;
        self.get_json("/analyses").await
    }

    async fn insert_analysis(&self, analysis: &SavedAnalysis) -> BackendResult<SavedAnalysis> {
        self.ensure_owner(&analysis.owner_id)?;
        self.send_json(Method::POST, "/analyses", analysis).await
    }

    async fn get_analysis(
        &self,
        owner: &UserId,
        id: Uuid,
    ) -> BackendResult<Option<SavedAnalysis>> {
        self.ensure_owner(owner)?;
        match self.get_json(&format!("/analyses/{}", id)).await {
            Ok(analysis) => Ok(Some(analysis)),
            Err(BackendError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete_analysis(&self, owner: &UserId, id: Uuid) -> BackendResult<()> {
        self.ensure_owner(owner)?;
        self.delete(&format!("/analyses/{}", id)).await
    }
}

#[async_trait]
impl CampaignAnalyzer for RemoteBackend {
    async fn analyze(&self, campaign_data: &str) -> Result<String, AnalysisError> {
        let request = AnalyzeRequest { campaign_data };
        match self
            .send_json::<_, AnalyzeResponse>(Method::POST, "/functions/analyze", &request)
            .await
        {
            Ok(response) => Ok(response.analysis),
            Err(BackendError::Status { status, message }) => {
                Err(AnalysisError::Upstream { status, message })
            }
            Err(e) => Err(AnalysisError::Backend(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_ws_url() {
        let backend = RemoteBackend::new("ws://localhost:8080", "test-key");
        assert_eq!(
            backend.build_ws_url(),
            "ws://localhost:8080/realtime?key=test-key"
        );

        let backend = RemoteBackend::new("https://trafego.example.com/", "test-key");
        assert_eq!(
            backend.build_ws_url(),
            "wss://trafego.example.com/realtime?key=test-key"
        );

        let backend = RemoteBackend::new("localhost:8080", "a key");
        assert_eq!(
            backend.build_ws_url(),
            "ws://localhost:8080/realtime?key=a%20key"
        );
    }

    #[test]
    fn test_build_http_url() {
        let backend = RemoteBackend::new("http://localhost:8080", "k");
        assert_eq!(backend.build_http_url("/me"), "http://localhost:8080/me");

        let backend = RemoteBackend::new("wss://trafego.example.com", "k");
        assert_eq!(
            backend.build_http_url("/me"),
            "https://trafego.example.com/me"
        );
    }

    #[test]
    fn test_tool_path_is_encoded() {
        assert_eq!(RemoteBackend::tool_path("cpa_maximo"), "/tools/cpa_maximo");
        assert_eq!(RemoteBackend::tool_path("a/b c"), "/tools/a%2Fb%20c");
    }

    #[test]
    fn test_owner_guard() {
        let mut backend = RemoteBackend::new("http://localhost", "k");
        assert!(matches!(
            backend.ensure_owner(&UserId::new("u1")),
            Err(BackendError::NoSession)
        ));

        backend.user = Some(User::new("u1"));
        assert!(backend.ensure_owner(&UserId::new("u1")).is_ok());
        assert!(matches!(
            backend.ensure_owner(&UserId::new("u2")),
            Err(BackendError::Status { status: 403, .. })
        ));
    }
}
