use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::AppState;
use crate::models::User;

/// API key entry in config
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyEntry {
    pub key: String,
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Config file structure
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

/// Authenticated user, added to request extensions after auth
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// API key store - maps key -> user
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, User>,
}

impl ApiKeyStore {
    pub fn from_entries(entries: impl IntoIterator<Item = ApiKeyEntry>) -> Self {
        let keys = entries
            .into_iter()
            .map(|entry| {
                let mut user = User::new(entry.user_id);
                user.email = entry.email;
                (entry.key, user)
            })
            .collect();
        Self { keys }
    }

    /// Load API keys from config file
    pub fn load(config_path: &Path) -> Self {
        let store = match std::fs::read_to_string(config_path) {
            Ok(contents) => match serde_yaml::from_str::<ConfigFile>(&contents) {
                Ok(config) => Self::from_entries(config.api_keys),
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
                Self::default()
            }
        };

        if store.keys.is_empty() {
            tracing::warn!("No API keys loaded - all authenticated requests will fail");
        } else {
            tracing::info!("Loaded {} API key(s)", store.keys.len());
        }
        store
    }

    /// Validate an API key and return the associated user
    pub fn validate(&self, key: &str) -> Option<User> {
        self.keys.get(key).cloned()
    }
}

/// Auth error response
#[derive(Serialize)]
struct AuthError {
    error: &'static str,
    message: &'static str,
}

fn unauthorized(error: &'static str, message: &'static str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(AuthError { error, message })).into_response()
}

/// `key` query parameter; browsers cannot set headers on websocket upgrades.
fn query_key(request: &Request) -> Option<String> {
    request.uri().query()?.split('&').find_map(|pair| {
        let value = pair.strip_prefix("key=")?;
        urlencoding::decode(value).ok().map(|v| v.into_owned())
    })
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) if h.starts_with("Bearer ") => h[7..].to_string(),
        Some(_) => {
            return unauthorized(
                "invalid_auth",
                "Authorization header must use Bearer scheme",
            )
        }
        None => match query_key(&request) {
            Some(key) => key,
            None => return unauthorized("missing_auth", "Authorization header required"),
        },
    };

    match state.api_keys.validate(&api_key) {
        Some(user) => {
            request.extensions_mut().insert(AuthUser(user));
            next.run(request).await
        }
        None => unauthorized("invalid_key", "Invalid API key"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_keys_from_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "api_keys:\n  - key: k1\n    user_id: u1\n    email: u1@example.com\n  - key: k2\n    user_id: u2\n",
        )
        .unwrap();

        let store = ApiKeyStore::load(&path);
        let user = store.validate("k1").unwrap();
        assert_eq!(user.id.as_str(), "u1");
        assert_eq!(user.email.as_deref(), Some("u1@example.com"));
        assert_eq!(store.validate("k2").unwrap().email, None);
        assert!(store.validate("nope").is_none());
    }

    #[test]
    fn test_missing_file_yields_empty_store() {
        let dir = tempdir().unwrap();
        let store = ApiKeyStore::load(&dir.path().join("missing.yaml"));
        assert!(store.validate("k1").is_none());
    }

    #[test]
    fn test_query_key_is_decoded() {
        let request = axum::http::Request::builder()
            .uri("/realtime?x=1&key=a%2Bb")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(query_key(&request).as_deref(), Some("a+b"));
    }
}
