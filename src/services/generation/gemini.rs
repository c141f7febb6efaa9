/// Gemini `generateContent` client
///
/// User turns are sent with role "user" and assistant turns with role
/// "model". The system prompt and any system turns form the
/// `systemInstruction`.
use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    error::{AppError, AppResult},
    models::{ChatRole, ChatTurn},
    services::generation::{Generator, SYSTEM_PROMPT},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    /// Text of the first candidate, parts concatenated
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().map(|p| p.text.as_str()).collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

fn build_request(turns: &[ChatTurn]) -> GenerateRequest {
    let mut instruction = SYSTEM_PROMPT.to_string();
    let mut contents = Vec::new();

    for turn in turns {
        match turn.role {
            ChatRole::System => {
                instruction.push_str("\n\n");
                instruction.push_str(&turn.content);
            }
            ChatRole::User | ChatRole::Assistant => {
                let role = if turn.role == ChatRole::User { "user" } else { "model" };
                contents.push(Content {
                    role: Some(role.to_string()),
                    parts: vec![Part {
                        text: turn.content.clone(),
                    }],
                });
            }
        }
    }

    GenerateRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part { text: instruction }],
        },
        contents,
    }
}

#[derive(Clone)]
pub struct GeminiGenerator {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(
        api_key: String,
        api_url: String,
        model: String,
        timeout: Duration,
    ) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait::async_trait]
impl Generator for GeminiGenerator {
    #[instrument(skip(self, turns), fields(turns = turns.len()))]
    async fn generate(&self, turns: &[ChatTurn]) -> AppResult<String> {
        let url = format!("{}/models/{}:generateContent", self.api_url, self.model);
        let request = build_request(turns);

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Gemini generation request failed");
                AppError::Generation(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, "Gemini generation returned an error status");
            return Err(AppError::Generation(format!(
                "Gemini API returned status {}: {}",
                status, body
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Generation(format!("Malformed Gemini response: {}", e)))?;

        parsed
            .text()
            .ok_or_else(|| AppError::Generation("Gemini returned no text".to_string()))
    }
}
