//! Hosted backend behind `trafego-server`.
//!
//! Serves tool records, products, ledger entries and saved analyses over
//! JSON routes, streams tool record changes over `/realtime`, and runs
//! campaign analyses through the configured [`CampaignAnalyzer`]. Every
//! route except `/health` requires an API key and is scoped to the user it
//! belongs to.
//!
//! # Configuration
//!
//! Environment variables:
//! - `TRAFEGO_PORT`: Port to listen on (default: 8080)
//! - `TRAFEGO_DATA_DIR`: Directory holding the database (default: ~/.local/share/trafego-server)
//! - `TRAFEGO_CONFIG`: Path to config file (default: ~/.config/trafego-server/config.yaml)
//! - `GEMINI_API_KEY`: Key for the analysis function
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "user1"
//!     email: "user1@example.com"
//! ```

mod auth;
mod realtime;
mod routes;

pub use auth::{auth_middleware, ApiKeyEntry, ApiKeyStore, AuthUser};
pub use routes::ServerError;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::analysis::CampaignAnalyzer;
use crate::backend::SqliteBackend;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Directory holding the database
    pub data_dir: PathBuf,
    /// Path to config file
    pub config_path: PathBuf,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let port = std::env::var("TRAFEGO_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let data_dir = std::env::var("TRAFEGO_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("trafego-server")
            });

        let config_path = std::env::var("TRAFEGO_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("trafego-server")
                    .join("config.yaml")
            });

        Self {
            port,
            data_dir,
            config_path,
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("trafego.db")
    }
}

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub backend: SqliteBackend,
    pub api_keys: Arc<ApiKeyStore>,
    pub analyzer: Arc<dyn CampaignAnalyzer>,
}

impl AppState {
    pub fn new(
        backend: SqliteBackend,
        api_keys: ApiKeyStore,
        analyzer: Arc<dyn CampaignAnalyzer>,
    ) -> Self {
        Self {
            backend,
            api_keys: Arc::new(api_keys),
            analyzer,
        }
    }
}

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new().route("/health", get(routes::health));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/me", get(routes::me))
        .route("/tools/{tool}", get(routes::get_tool).put(routes::put_tool))
        .route(
            "/products",
            get(routes::list_products).post(routes::create_product),
        )
        .route("/products/{id}", axum::routing::delete(routes::delete_product))
        .route(
            "/products/{id}/has-metrics",
            get(routes::product_has_metrics),
        )
        .route("/metrics", get(routes::get_metrics).put(routes::put_metric))
        .route(
            "/analyses",
            get(routes::list_analyses).post(routes::create_analysis),
        )
        .route(
            "/analyses/{id}",
            get(routes::get_analysis).delete(routes::delete_analysis),
        )
        .route("/functions/analyze", post(routes::analyze))
        .route("/realtime", get(realtime::realtime_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisError;
    use crate::backend::{DashboardStore, RealtimeHub, RemoteBackend, ToolStore};
    use crate::db::init_db;
    use crate::models::{ChangeKind, DailyMetric, Product, SavedAnalysis, ToolRecord, UserId};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct EchoAnalyzer;

    #[async_trait]
    impl CampaignAnalyzer for EchoAnalyzer {
        async fn analyze(&self, campaign_data: &str) -> Result<String, AnalysisError> {
            if campaign_data == "boom" {
                return Err(AnalysisError::Upstream {
                    status: 429,
                    message: "Gemini API error: quota".into(),
                });
            }
            Ok(format!("analysis: {}", campaign_data))
        }
    }

    async fn setup() -> (Router, SqliteBackend, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("server.db")).await.unwrap();
        let backend = SqliteBackend::new(pool, Arc::new(RealtimeHub::new()));
        let keys = ApiKeyStore::from_entries(vec![
            ApiKeyEntry {
                key: "key-1".into(),
                user_id: "u1".into(),
                email: Some("u1@example.com".into()),
            },
            ApiKeyEntry {
                key: "key-2".into(),
                user_id: "u2".into(),
                email: None,
            },
        ]);
        let state = AppState::new(backend.clone(), keys, Arc::new(EchoAnalyzer));
        (router(state), backend, temp_dir)
    }

    fn request(method: &str, uri: &str, key: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {}", key));
        match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let (app, _, _dir) = setup().await;
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_auth_failures() {
        let (app, _, _dir) = setup().await;

        let req = Request::get("/me").body(Body::empty()).unwrap();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "missing_auth");

        let req = Request::get("/me")
            .header("Authorization", "Basic abc")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_auth");

        let (status, body) = call(&app, request("GET", "/me", "wrong", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_key");
    }

    #[tokio::test]
    async fn test_me_with_header_or_query_key() {
        let (app, _, _dir) = setup().await;

        let (status, body) = call(&app, request("GET", "/me", "key-1", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "u1");
        assert_eq!(body["email"], "u1@example.com");

        let req = Request::get("/me?key=key-2").body(Body::empty()).unwrap();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "u2");
    }

    #[tokio::test]
    async fn test_tool_records_are_scoped_to_caller() {
        let (app, _, _dir) = setup().await;
        let record = ToolRecord::new(UserId::new("u1"), "sonar", json!({"ctr": 2.0}));

        let (status, body) = call(
            &app,
            request(
                "PUT",
                "/tools/sonar",
                "key-1",
                Some(serde_json::to_value(&record).unwrap()),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["payload"]["ctr"], 2.0);

        let (status, body) = call(&app, request("GET", "/tools/sonar?limit=1", "key-1", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (_, body) = call(&app, request("GET", "/tools/sonar", "key-2", None)).await;
        assert!(body.as_array().unwrap().is_empty());

        // u2 cannot write u1's row
        let (status, _) = call(
            &app,
            request(
                "PUT",
                "/tools/sonar",
                "key-2",
                Some(serde_json::to_value(&record).unwrap()),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &app,
            request(
                "PUT",
                "/tools/simulador",
                "key-1",
                Some(serde_json::to_value(&record).unwrap()),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_product_with_metrics_cannot_be_deleted() {
        let (app, backend, _dir) = setup().await;
        let product = Product::new(UserId::new("u1"), "Curso", 197.0);

        let (status, _) = call(
            &app,
            request(
                "POST",
                "/products",
                "key-1",
                Some(serde_json::to_value(&product).unwrap()),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let mut metric = DailyMetric::new(
            UserId::new("u1"),
            product.id,
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
        );
        metric.investment = 50.0;
        backend.upsert_daily_metric(&metric).await.unwrap();

        let uri = format!("/products/{}/has-metrics", product.id);
        let (_, body) = call(&app, request("GET", &uri, "key-1", None)).await;
        assert_eq!(body["has_metrics"], true);

        let uri = format!("/products/{}", product.id);
        let (status, body) = call(&app, request("DELETE", &uri, "key-1", None)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("ledger"));
    }

    #[tokio::test]
    async fn test_delete_missing_product_is_not_found() {
        let (app, _, _dir) = setup().await;
        let uri = format!("/products/{}", uuid::Uuid::new_v4());
        let (status, _) = call(&app, request("DELETE", &uri, "key-1", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_analysis_is_not_found() {
        let (app, _, _dir) = setup().await;
        let uri = format!("/analyses/{}", uuid::Uuid::new_v4());
        let (status, _) = call(&app, request("GET", &uri, "key-1", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_analyze_function() {
        let (app, _, _dir) = setup().await;

        let (status, body) = call(
            &app,
            request(
                "POST",
                "/functions/analyze",
                "key-1",
                Some(json!({"campaignData": "CTR 1%"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["analysis"], "analysis: CTR 1%");

        let (status, body) = call(
            &app,
            request("POST", "/functions/analyze", "key-1", Some(json!({}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("10,000"));

        let too_long = "a".repeat(crate::analysis::MAX_CAMPAIGN_DATA_CHARS + 1);
        let (status, _) = call(
            &app,
            request(
                "POST",
                "/functions/analyze",
                "key-1",
                Some(json!({ "campaignData": too_long })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            request(
                "POST",
                "/functions/analyze",
                "key-1",
                Some(json!({"campaignData": "boom"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Gemini API error: quota");
    }

    async fn spawn_server() -> (String, TempDir) {
        let (app, _, dir) = setup().await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), dir)
    }

    #[tokio::test]
    async fn test_remote_backend_round_trip() {
        let (url, _dir) = spawn_server().await;
        let remote = RemoteBackend::connect(&url, "key-1").await.unwrap();
        let owner = UserId::new("u1");

        let product = remote
            .insert_product(&Product::new(owner.clone(), "Mentoria", 997.0))
            .await
            .unwrap();
        assert_eq!(remote.list_products(&owner).await.unwrap().len(), 1);
        assert!(!remote.product_has_metrics(&owner, product.id).await.unwrap());

        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let mut metric = DailyMetric::new(owner.clone(), product.id, date);
        metric.revenue = 1994.0;
        metric.sales = Some(2);
        remote.upsert_daily_metric(&metric).await.unwrap();
        let metrics = remote
            .select_daily_metrics(&owner, product.id, date, date)
            .await
            .unwrap();
        assert_eq!(metrics[0].sales, Some(2));

        assert!(matches!(
            remote.delete_product(&owner, product.id).await,
            Err(crate::backend::BackendError::Conflict(_))
        ));

        let analysis = SavedAnalysis::new(owner.clone(), "Launch", "data", "result");
        remote.insert_analysis(&analysis).await.unwrap();
        assert_eq!(remote.list_analyses(&owner).await.unwrap().len(), 1);
        assert!(remote
            .get_analysis(&owner, analysis.id)
            .await
            .unwrap()
            .is_some());
        remote.delete_analysis(&owner, analysis.id).await.unwrap();
        assert!(remote
            .get_analysis(&owner, analysis.id)
            .await
            .unwrap()
            .is_none());

        assert_eq!(
            remote.analyze("CTR 1%").await.unwrap(),
            "analysis: CTR 1%"
        );
    }

    #[tokio::test]
    async fn test_remote_subscription_receives_changes() {
        let (url, _dir) = spawn_server().await;
        let remote = RemoteBackend::connect(&url, "key-1").await.unwrap();
        let owner = UserId::new("u1");

        let mut subscription = remote.subscribe(&owner, "tool-sonar-u1").await.unwrap();

        let record = ToolRecord::new(owner.clone(), "sonar", json!({"ctr": 1.0}));
        remote.upsert_tool_record(&record).await.unwrap();
        let record = ToolRecord::new(owner.clone(), "sonar", json!({"ctr": 3.0}));
        remote.upsert_tool_record(&record).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), subscription.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.kind, ChangeKind::Insert);

        let second = tokio::time::timeout(Duration::from_secs(5), subscription.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.kind, ChangeKind::Update);
        assert_eq!(second.new.unwrap().payload["ctr"], 3.0);

        subscription.close();
    }
}
