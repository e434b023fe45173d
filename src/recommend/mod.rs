//! Recommendation Service Boundary
//!
//! Maps a free-text condition ("비가 와서 시원한 게 땡겨요") to one menu
//! suggestion plus a justification. Whatever comes back is untrusted:
//! the payload shape is validated here and the menu name is re-checked
//! against the catalog by the selection controller.

mod gemini;

pub use gemini::{validate_api_key, GeminiProvider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::menu::Catalog;

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("an API key is required")]
    MissingCredential,
    #[error("the API key was rejected")]
    InvalidCredential,
    #[error("recommendation request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("recommendation service answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed recommendation: {0}")]
    Malformed(String),
    #[error("recommendation service returned no text")]
    EmptyResponse,
}

impl RecommendError {
    /// The service answered, but with nothing usable
    pub fn is_unusable_payload(&self) -> bool {
        matches!(self, RecommendError::Malformed(_) | RecommendError::EmptyResponse)
    }
}

/// A suggestion as returned by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub menu_name: String,
    pub reason: String,
}

#[async_trait]
pub trait RecommendationProvider: Send + Sync {
    async fn recommend(&self, condition: &str) -> Result<Recommendation, RecommendError>;
}

/// Parses the service's text answer into a [`Recommendation`].
///
/// Accepts a bare JSON object, optionally wrapped in a Markdown code fence.
/// Both `menuName` and `reason` must be strings; values are passed through
/// untouched.
pub fn parse_recommendation(text: &str) -> Result<Recommendation, RecommendError> {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return Err(RecommendError::EmptyResponse);
    }

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| RecommendError::Malformed(format!("not JSON: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| RecommendError::Malformed("expected a JSON object".into()))?;

    let field = |name: &str| -> Result<String, RecommendError> {
        object
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| RecommendError::Malformed(format!("missing string field '{}'", name)))
    };

    Ok(Recommendation {
        menu_name: field("menuName")?,
        reason: field("reason")?,
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop an optional language tag such as ```json
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Instructions handed to the model, built from the live catalog
#[derive(Debug, Clone)]
pub struct RecommendationPrompt {
    menu_names: Vec<String>,
}

impl RecommendationPrompt {
    pub fn for_catalog(catalog: &Catalog) -> Self {
        Self {
            menu_names: catalog.names().into_iter().map(str::to_string).collect(),
        }
    }

    pub fn system_instruction(&self) -> String {
        format!(
            "당신은 '그린FC' 프로 축구팀의 전담 영양 코치입니다.\n\
             오늘의 훈련 상황과 선수들의 컨디션에 가장 적합한 메뉴 하나를 추천해야 합니다.\n\n\
             [필수 규칙]\n\
             1. 반드시 다음 메뉴 중 하나만 선택: {}\n\
             2. 선수들에게 기운을 북돋아주는 전문가다운 말투 사용.\n\
             3. 반드시 JSON 형식으로만 응답: {{\"menuName\": \"...\", \"reason\": \"...\"}}",
            self.menu_names.join(", ")
        )
    }

    pub fn user_content(&self, condition: &str) -> String {
        format!("상황: {}", condition)
    }

    /// Structured-output schema: an object with required string fields
    pub fn response_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "OBJECT",
            "properties": {
                "menuName": { "type": "STRING" },
                "reason": { "type": "STRING" }
            },
            "required": ["menuName", "reason"]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_object() {
        let rec = parse_recommendation(r#"{"menuName": "김치찌개", "reason": "test-reason"}"#).unwrap();
        assert_eq!(rec.menu_name, "김치찌개");
        assert_eq!(rec.reason, "test-reason");
    }

    #[test]
    fn test_parse_fenced_object() {
        let text = "```json\n{\"menuName\": \"동태탕\", \"reason\": \"시원하게\"}\n```";
        let rec = parse_recommendation(text).unwrap();
        assert_eq!(rec.menu_name, "동태탕");
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!(matches!(parse_recommendation("   "), Err(RecommendError::EmptyResponse)));
        assert!(matches!(parse_recommendation("김치찌개"), Err(RecommendError::Malformed(_))));
        assert!(matches!(parse_recommendation("[1, 2]"), Err(RecommendError::Malformed(_))));
        assert!(matches!(
            parse_recommendation(r#"{"menuName": 3, "reason": "x"}"#),
            Err(RecommendError::Malformed(_))
        ));
        assert!(matches!(
            parse_recommendation(r#"{"menuName": "김치찌개"}"#),
            Err(RecommendError::Malformed(_))
        ));
    }

    #[test]
    fn test_prompt_lists_catalog_names() {
        let prompt = RecommendationPrompt::for_catalog(&Catalog::green_fc());
        let system = prompt.system_instruction();
        assert!(system.contains("순두부찌개, 김치찌개, 동태탕, 선지해장국"));
        assert!(system.contains(r#"{"menuName": "...", "reason": "..."}"#));
        assert_eq!(prompt.user_content("비 옴"), "상황: 비 옴");
    }
}
