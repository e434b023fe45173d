use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use super::{parse_recommendation, Recommendation, RecommendError, RecommendationPrompt, RecommendationProvider};
use crate::config::{ApiKey, GeminiConfig};
use crate::menu::Catalog;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini `generateContent` client constrained to the catalog's menu names
pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
    api_key: ApiKey,
    prompt: RecommendationPrompt,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig, api_key: ApiKey, catalog: &Catalog) -> Self {
        Self {
            client: Client::new(),
            config,
            api_key,
            prompt: RecommendationPrompt::for_catalog(catalog),
        }
    }

    fn endpoint(config: &GeminiConfig) -> String {
        format!(
            "{}/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        )
    }

    fn request_body(&self, condition: &str) -> Value {
        json!({
            "systemInstruction": {
                "parts": [{ "text": self.prompt.system_instruction() }]
            },
            "contents": [{
                "role": "user",
                "parts": [{ "text": self.prompt.user_content(condition) }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": RecommendationPrompt::response_schema()
            }
        })
    }
}

/// Sends one request and returns the first candidate's text.
async fn generate(client: &Client, config: &GeminiConfig, api_key: &ApiKey, body: &Value) -> Result<String, RecommendError> {
    let res = client
        .post(GeminiProvider::endpoint(config))
        .header(API_KEY_HEADER, api_key.expose())
        .json(body)
        .send()
        .await?;

    let status = res.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RecommendError::InvalidCredential);
    }
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        // Gemini reports a bad key as 400 API_KEY_INVALID
        if body.contains("API_KEY_INVALID") {
            return Err(RecommendError::InvalidCredential);
        }
        return Err(RecommendError::Status { status: status.as_u16(), body });
    }

    let json: Value = res.json().await?;
    extract_text(&json).ok_or(RecommendError::EmptyResponse)
}

fn extract_text(json: &Value) -> Option<String> {
    let parts = json["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl RecommendationProvider for GeminiProvider {
    async fn recommend(&self, condition: &str) -> Result<Recommendation, RecommendError> {
        debug!("Asking {} for a recommendation", self.config.model);

        let body = self.request_body(condition);
        let text = generate(&self.client, &self.config, &self.api_key, &body)
            .await
            .inspect_err(|e| error!("Gemini request failed: {}", e))?;

        parse_recommendation(&text).inspect_err(|e| warn!("Unusable Gemini answer: {}", e))
    }
}

/// Checks that a key actually works.
///
/// Keys that are obviously too short are refused without touching the
/// network; otherwise a single one-token request must come back with text.
pub async fn validate_api_key(config: &GeminiConfig, raw_key: &str) -> bool {
    let Ok(api_key) = ApiKey::parse(raw_key) else {
        return false;
    };

    let body = json!({
        "contents": [{ "role": "user", "parts": [{ "text": "Connection test" }] }],
        "generationConfig": { "maxOutputTokens": 1 }
    });

    match generate(&Client::new(), config, &api_key, &body).await {
        Ok(_) => true,
        Err(e) => {
            error!("API key validation failed: {}", e);
            false
        }
    }
}
