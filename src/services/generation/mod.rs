//! Generative model seam and the parsing of its structured replies.

use std::sync::LazyLock;

use regex::Regex;

use crate::{
    error::AppResult,
    models::{ChatTurn, GeneratedReply},
};

pub mod gemini;

pub use gemini::GeminiGenerator;

/// Persona and reply contract sent as the system instruction of every call
pub const SYSTEM_PROMPT: &str = r#"You are the movie recommendation assistant for Movie Magic.

Help people find films they will enjoy. Ask about the genres, moods, actors or
directors they like when the request is vague. Recommend 3 to 5 movies at a
time and say briefly why each one fits. Where it makes sense, add 2 or 3
thrillers that pair well with each recommendation. Be warm and conversational,
knowledgeable without being pretentious.

Always reply with a single JSON object inside a ```json fenced block:

```json
{
  "message": "A short conversational reply introducing the picks",
  "movies": [
    {
      "id": 550,
      "title": "Fight Club",
      "reason": "One or two sentences on why it fits",
      "thrillers": [{"id": 807, "title": "Se7en"}]
    }
  ]
}
```

Use the TMDB ids given in the context when you have them and 0 when you do
not. If the user is only chatting, reply in the same format with an empty
"movies" array."#;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid fenced json pattern")
});

/// Chat completion against a generative model
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model's raw text for the conversation so far
    ///
    /// `system` turns are folded into the system instruction.
    async fn generate(&self, turns: &[ChatTurn]) -> AppResult<String>;
}

/// Extracts the structured reply from raw model text
///
/// Looks for a fenced JSON block first, then tries the whole text. Anything
/// that does not parse becomes a plain message with no movies.
pub fn parse_structured_response(raw: &str) -> GeneratedReply {
    if let Some(json) = FENCED_JSON.captures(raw).and_then(|c| c.get(1)) {
        match serde_json::from_str::<GeneratedReply>(json.as_str()) {
            Ok(reply) => return reply,
            Err(e) => tracing::warn!(error = %e, "Fenced JSON in model reply did not parse"),
        }
    }

    match serde_json::from_str::<GeneratedReply>(raw.trim()) {
        Ok(reply) => reply,
        Err(_) => {
            tracing::warn!(chars = raw.len(), "Model reply is not structured, using it as plain text");
            GeneratedReply::plain_text(raw)
        }
    }
}
