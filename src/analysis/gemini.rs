//! Campaign analysis through Google's Gemini `generateContent` API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::prompt::{self, FALLBACK_ANALYSIS};
use super::{validate_campaign_data, AnalysisError, CampaignAnalyzer};

pub const GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash-latest:generateContent";

const BLOCK_NONE_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    fn turn(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetySetting {
    pub category: &'static str,
    pub threshold: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    pub safety_settings: Vec<SafetySetting>,
}

impl GenerateRequest {
    /// Prompt, knowledge base and data as a five-turn conversation.
    pub fn for_campaign(campaign_data: &str) -> Self {
        Self {
            contents: vec![
                Content::turn("user", prompt::MASTER_PROMPT),
                Content::turn("model", prompt::PROMPT_ACK),
                Content::turn("user", prompt::knowledge_turn()),
                Content::turn("model", prompt::KNOWLEDGE_ACK),
                Content::turn("user", prompt::data_turn(campaign_data)),
            ],
            safety_settings: BLOCK_NONE_CATEGORIES
                .into_iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
}

impl GenerateResponse {
    /// Text of the first part of the first candidate, or the fallback.
    pub fn analysis_text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.as_deref())
            .filter(|text| !text.is_empty())
            .unwrap_or(FALLBACK_ANALYSIS)
            .to_string()
    }
}

/// Calls Gemini directly with a server-side API key.
#[derive(Debug, Clone)]
pub struct GeminiAnalyzer {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

impl GeminiAnalyzer {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            endpoint: GEMINI_ENDPOINT.to_string(),
        }
    }

    /// Reads the key from `GEMINI_API_KEY`.
    pub fn from_env() -> Self {
        Self::new(std::env::var("GEMINI_API_KEY").ok())
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl CampaignAnalyzer for GeminiAnalyzer {
    async fn analyze(&self, campaign_data: &str) -> Result<String, AnalysisError> {
        validate_campaign_data(campaign_data)?;
        let api_key = self.api_key.as_deref().ok_or(AnalysisError::MissingApiKey)?;

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .json(&GenerateRequest::for_campaign(campaign_data))
            .send()
            .await
            .map_err(|e| AnalysisError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Gemini API error ({}): {}", status, body);
            return Err(AnalysisError::Upstream {
                status: status.as_u16(),
                message: format!("Gemini API error: {}", body),
            });
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Http(e.to_string()))?;
        Ok(result.analysis_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_layout() {
        let request = GenerateRequest::for_campaign("CTR 0.4%, CPA R$ 90");
        let value = serde_json::to_value(&request).unwrap();

        let contents = value["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 5);
        let roles: Vec<&str> = contents
            .iter()
            .map(|c| c["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "model", "user", "model", "user"]);
        assert!(contents[4]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .ends_with("CTR 0.4%, CPA R$ 90"));

        let safety = value["safetySettings"].as_array().unwrap();
        assert_eq!(safety.len(), 4);
        assert!(safety.iter().all(|s| s["threshold"] == "BLOCK_NONE"));
    }

    #[test]
    fn test_analysis_text_and_fallback() {
        let full: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "Scale campaign A."}]}}]
        }))
        .unwrap();
        assert_eq!(full.analysis_text(), "Scale campaign A.");

        let empty: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.analysis_text(), FALLBACK_ANALYSIS);

        let no_parts: GenerateResponse =
            serde_json::from_value(json!({"candidates": [{"content": {"parts": []}}]})).unwrap();
        assert_eq!(no_parts.analysis_text(), FALLBACK_ANALYSIS);
    }

    #[tokio::test]
    async fn test_missing_key_is_reported_before_any_call() {
        let analyzer = GeminiAnalyzer::new(Some("  ".into())).with_endpoint("http://127.0.0.1:9");
        assert!(!analyzer.has_api_key());
        assert!(matches!(
            analyzer.analyze("some data").await,
            Err(AnalysisError::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn test_invalid_data_checked_first() {
        let analyzer = GeminiAnalyzer::new(None);
        let too_long = "x".repeat(10_001);
        assert!(matches!(
            analyzer.analyze(&too_long).await,
            Err(AnalysisError::InvalidInput)
        ));
    }
}
