//! Gemini API client for text completions with optional image input.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::RelayError;
use crate::relay::history::{Role, Turn};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// A validated raster image attached to a prompt.
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

/// Narrow seam over the completion endpoint so tests can substitute fakes.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate a reply for the conversation so far. The last turn is the
    /// new user message; `image` (if any) is attached to it.
    async fn complete(
        &self,
        system: &str,
        turns: &[Turn],
        image: Option<&ImagePayload>,
    ) -> Result<String, RelayError>;
}

pub struct GeminiClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest {
    #[serde(rename = "systemInstruction")]
    system_instruction: Content,
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            api_key,
            model,
            client,
        }
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn complete(
        &self,
        system: &str,
        turns: &[Turn],
        image: Option<&ImagePayload>,
    ) -> Result<String, RelayError> {
        let request = build_request(system, turns, image);
        info!(
            "🤖 Calling Gemini: {} turn(s), image: {}",
            turns.len(),
            image.is_some()
        );

        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_BASE, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RelayError::Upstream(format!("HTTP error: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::Upstream(format!("Failed to read response: {e}")))?;

        debug!("Gemini response status: {status}");

        if !status.is_success() {
            return Err(RelayError::Upstream(format!("API error {status}: {body}")));
        }

        parse_response(&body)
    }
}

fn build_request(system: &str, turns: &[Turn], image: Option<&ImagePayload>) -> GenerateRequest {
    let mut contents: Vec<Content> = turns
        .iter()
        .map(|turn| Content {
            role: Some(match turn.role {
                Role::User => "user",
                Role::Assistant => "model",
            }),
            parts: vec![Part {
                text: Some(turn.content.clone()),
                inline_data: None,
            }],
        })
        .collect();

    // The image belongs to the newest user turn.
    if let Some(image) = image
        && let Some(last) = contents.last_mut()
    {
        last.parts.push(Part {
            text: None,
            inline_data: Some(InlineData {
                mime_type: image.mime_type.to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(&image.bytes),
            }),
        });
    }

    GenerateRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part {
                text: Some(system.to_string()),
                inline_data: None,
            }],
        },
        contents,
    }
}

fn parse_response(body: &str) -> Result<String, RelayError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| RelayError::Upstream(format!("Failed to parse response: {e}")))?;

    if let Some(error) = parsed.error {
        return Err(RelayError::Upstream(format!("Gemini error: {}", error.message)));
    }

    let candidates = parsed
        .candidates
        .ok_or_else(|| RelayError::Upstream("No candidates in response".to_string()))?;
    let candidate = candidates
        .first()
        .ok_or_else(|| RelayError::Upstream("Empty candidates array".to_string()))?;
    let content = candidate
        .content
        .as_ref()
        .ok_or_else(|| RelayError::Upstream("No content in candidate".to_string()))?;

    let text: String = content
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(RelayError::Upstream("Empty completion text".to_string()));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_roles_and_system_instruction() {
        let turns = vec![
            Turn::user("What is 2+2?"),
            Turn::assistant("4"),
            Turn::user("And 3+3?"),
        ];
        let request = build_request("be helpful", &turns, None);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            "be helpful"
        );
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][2]["role"], "user");
        assert_eq!(json["contents"][2]["parts"][0]["text"], "And 3+3?");
    }

    #[test]
    fn test_request_attaches_image_to_last_turn() {
        let turns = vec![Turn::user("what is this?")];
        let image = ImagePayload {
            bytes: vec![1, 2, 3],
            mime_type: "image/png",
        };
        let request = build_request("sys", &turns, Some(&image));
        let json = serde_json::to_value(&request).unwrap();

        let parts = json["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "AQID");
    }

    #[test]
    fn test_parse_success() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "Hello "}, {"text": "there"}]}}
            ]
        }"#;
        assert_eq!(parse_response(body).unwrap(), "Hello there");
    }

    #[test]
    fn test_parse_api_error_payload() {
        let body = r#"{"error": {"message": "quota exceeded"}}"#;
        let err = parse_response(body).unwrap_err();
        assert!(matches!(err, RelayError::Upstream(_)));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_parse_empty_candidates() {
        let body = r#"{"candidates": []}"#;
        assert!(matches!(
            parse_response(body).unwrap_err(),
            RelayError::Upstream(_)
        ));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_response("not json").unwrap_err(),
            RelayError::Upstream(_)
        ));
    }
}
