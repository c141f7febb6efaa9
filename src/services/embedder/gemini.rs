/// Gemini `embedContent` provider
///
/// POST {api_url}/models/{model}:embedContent with the key in the
/// `x-goog-api-key` header. The response carries `embedding.values`.
use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    services::embedder::EmbeddingProvider,
};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Clone)]
pub struct GeminiEmbeddingProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

impl GeminiEmbeddingProvider {
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

    fn endpoint(&self) -> String {
        format!("{}/models/{}:embedContent", self.api_url, self.model)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> AppResult<Vec<f32>> {
        let request = EmbedRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: vec![Part { text }],
            },
        };

        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Gemini embedding API returned status {}: {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = response.json().await?;
        Ok(parsed.embedding.values)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let provider = GeminiEmbeddingProvider::new(
            "key".to_string(),
            "https://generativelanguage.googleapis.com/v1beta/".to_string(),
            "text-embedding-004".to_string(),
            Duration::from_secs(10),
        )
        .unwrap();

        assert_eq!(
            provider.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:embedContent"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let request = EmbedRequest {
            model: "models/text-embedding-004".to_string(),
            content: Content {
                parts: vec![Part { text: "a heist" }],
            },
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["model"], "models/text-embedding-004");
        assert_eq!(body["content"]["parts"][0]["text"], "a heist");
    }

    #[test]
    fn test_response_parsing() {
        let parsed: EmbedResponse =
            serde_json::from_str(r#"{"embedding": {"values": [0.1, -0.2, 0.3]}}"#).unwrap();
        assert_eq!(parsed.embedding.values, vec![0.1, -0.2, 0.3]);
    }
}
