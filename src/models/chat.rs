use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    /// Hints for the generation model, such as retrieved grounding context
    System,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

impl Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            "system" => Ok(ChatRole::System),
            other => Err(format!("unknown chat role '{}'", other)),
        }
    }
}

/// One message handed to the generation model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Conversation {
    pub id: i64,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

/// A persisted conversation message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// Converts the stored message back into a turn for the generation model
    ///
    /// Assistant replies are persisted as the structured JSON payload; only
    /// the conversational text is replayed.
    pub fn to_turn(&self) -> ChatTurn {
        let content = match self.role {
            ChatRole::Assistant => serde_json::from_str::<RecommendationPayload>(&self.content)
                .map(|payload| payload.message)
                .unwrap_or_else(|_| self.content.clone()),
            _ => self.content.clone(),
        };

        ChatTurn {
            role: self.role,
            content,
        }
    }
}

// ============================================================================
// Generation output
// ============================================================================

/// Model output uses `null` and missing fields interchangeably
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Companion pick attached to a recommendation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThrillerPick {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
}

/// A movie suggested by the generation model
///
/// An `id` of 0 means the model did not know the catalog identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieCandidate {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thrillers: Vec<ThrillerPick>,
}

impl MovieCandidate {
    /// Whether the candidate carries a real catalog identifier
    pub fn is_resolvable(&self) -> bool {
        self.id > 0
    }
}

/// Structured reply expected from the generation model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedReply {
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub movies: Vec<MovieCandidate>,
}

impl GeneratedReply {
    /// Reply used when the model output is not the expected JSON object
    pub fn plain_text(text: impl Into<String>) -> Self {
        Self {
            message: text.into(),
            movies: Vec::new(),
        }
    }
}

// ============================================================================
// Assistant reply
// ============================================================================

/// A recommendation returned to the client, enriched from the catalog when possible
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieRecommendation {
    pub id: i64,
    pub title: String,
    pub reason: Option<String>,
    pub poster_path: Option<String>,
    pub vote_average: Option<f64>,
    pub release_date: Option<String>,
    pub overview: Option<String>,
    #[serde(default)]
    pub thrillers: Vec<ThrillerPick>,
    pub trailer_key: Option<String>,
}

impl From<MovieCandidate> for MovieRecommendation {
    fn from(candidate: MovieCandidate) -> Self {
        Self {
            id: candidate.id,
            title: candidate.title,
            reason: candidate.reason,
            poster_path: None,
            vote_average: None,
            release_date: None,
            overview: None,
            thrillers: candidate.thrillers,
            trailer_key: None,
        }
    }
}

/// The assistant's structured payload, also what gets persisted as its message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationPayload {
    pub message: String,
    #[serde(default)]
    pub movies: Vec<MovieRecommendation>,
}

// ============================================================================
// HTTP contracts
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub user_id: String,
    #[serde(default)]
    pub conversation_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub message: String,
    pub conversation_id: i64,
    pub movies: Vec<MovieRecommendation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_role_round_trips_through_str() {
        for role in [ChatRole::User, ChatRole::Assistant, ChatRole::System] {
            assert_eq!(role.as_str().parse::<ChatRole>().unwrap(), role);
        }
        assert!("moderator".parse::<ChatRole>().is_err());
    }

    #[test]
    fn test_candidate_defaults_missing_fields() {
        let candidate: MovieCandidate =
            serde_json::from_str(r#"{"title": "Heat"}"#).unwrap();
        assert_eq!(candidate.id, 0);
        assert!(!candidate.is_resolvable());
        assert!(candidate.reason.is_none());
        assert!(candidate.thrillers.is_empty());
    }

    #[test]
    fn test_stored_assistant_message_replays_message_text() {
        let payload = RecommendationPayload {
            message: "Try these heist films".to_string(),
            movies: vec![],
        };
        let stored = StoredMessage {
            id: 1,
            conversation_id: 7,
            role: ChatRole::Assistant,
            content: serde_json::to_string(&payload).unwrap(),
            created_at: Utc::now(),
        };

        assert_eq!(stored.to_turn(), ChatTurn::assistant("Try these heist films"));
    }

    #[test]
    fn test_stored_plain_assistant_message_replays_verbatim() {
        let stored = StoredMessage {
            id: 2,
            conversation_id: 7,
            role: ChatRole::Assistant,
            content: "Hello there".to_string(),
            created_at: Utc::now(),
        };

        assert_eq!(stored.to_turn().content, "Hello there");
    }
}
