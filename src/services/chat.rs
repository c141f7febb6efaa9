use std::sync::Arc;

use tracing::instrument;

use crate::{
    db::ConversationRepository,
    error::{AppError, AppResult},
    models::{ChatRequest, ChatResponse, ChatRole, ChatTurn, Conversation},
    services::recommendations::RecommendationEngine,
};

/// Longest user message accepted for a chat turn, in characters
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Runs one chat turn: history, recommendation and persistence
#[derive(Clone)]
pub struct ChatService {
    conversations: Arc<dyn ConversationRepository>,
    engine: RecommendationEngine,
}

impl ChatService {
    pub fn new(conversations: Arc<dyn ConversationRepository>, engine: RecommendationEngine) -> Self {
        Self {
            conversations,
            engine,
        }
    }

    #[instrument(skip(self, request), fields(user_id = %request.user_id, conversation_id = ?request.conversation_id))]
    pub async fn handle_turn(&self, request: ChatRequest) -> AppResult<ChatResponse> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(AppError::InvalidInput("Message cannot be empty".to_string()));
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(AppError::InvalidInput(format!(
                "Message cannot exceed {} characters",
                MAX_MESSAGE_CHARS
            )));
        }
        let user_id = request.user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::InvalidInput("user_id is required".to_string()));
        }

        let conversation = self.open_conversation(request.conversation_id, user_id).await?;

        let history: Vec<ChatTurn> = self
            .conversations
            .list_messages(conversation.id)
            .await?
            .iter()
            .map(|m| m.to_turn())
            .collect();

        self.conversations
            .append_message(conversation.id, ChatRole::User, message)
            .await?;

        let payload = self.engine.recommend(message, &history).await?;

        let stored = serde_json::to_string(&payload)
            .map_err(|e| AppError::Internal(format!("Failed to serialize reply: {}", e)))?;
        self.conversations
            .append_message(conversation.id, ChatRole::Assistant, &stored)
            .await?;

        tracing::info!(
            conversation_id = conversation.id,
            movies = payload.movies.len(),
            "Chat turn completed"
        );

        Ok(ChatResponse {
            message: payload.message,
            conversation_id: conversation.id,
            movies: payload.movies,
        })
    }

    async fn open_conversation(
        &self,
        conversation_id: Option<i64>,
        user_id: &str,
    ) -> AppResult<Conversation> {
        match conversation_id {
            Some(id) => {
                let conversation = self
                    .conversations
                    .get_conversation(id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("conversation {}", id)))?;
                if conversation.user_id != user_id {
                    // Another user's conversation reads as missing
                    return Err(AppError::NotFound(format!("conversation {}", id)));
                }
                Ok(conversation)
            }
            None => {
                let conversation = self.conversations.create_conversation(user_id).await?;
                tracing::info!(conversation_id = conversation.id, "Started conversation");
                Ok(conversation)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{MemoryConversationRepository, MemoryCorpusRepository},
        models::{RecommendationPayload, EMBEDDING_DIMENSION},
        services::{
            catalog::MockCatalogClient,
            embedder::{Embedder, MockEmbeddingProvider},
            embedding_store::EmbeddingStore,
            generation::MockGenerator,
        },
    };

    fn service_with(
        generator: MockGenerator,
    ) -> (ChatService, Arc<MemoryConversationRepository>) {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_name().return_const("mock");
        provider
            .expect_embed_text()
            .returning(|_| Ok(vec![0.5; EMBEDDING_DIMENSION]));

        let store = EmbeddingStore::new(
            Arc::new(MemoryCorpusRepository::new()),
            Embedder::new(Arc::new(provider), 8000),
        );
        let engine = RecommendationEngine::new(
            store,
            Arc::new(generator),
            Arc::new(MockCatalogClient::new()),
        );
        let conversations = Arc::new(MemoryConversationRepository::new());
        (ChatService::new(conversations.clone(), engine), conversations)
    }

    fn request(message: &str, conversation_id: Option<i64>) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            user_id: "cli_user".to_string(),
            conversation_id,
        }
    }

    #[tokio::test]
    async fn test_turn_persists_user_and_assistant_messages() {
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .returning(|_| Ok(r#"{"message": "What mood are you in?", "movies": []}"#.to_string()));
        let (service, conversations) = service_with(generator);

        let response = service.handle_turn(request("  hello  ", None)).await.unwrap();

        assert_eq!(response.message, "What mood are you in?");
        let messages = conversations
            .list_messages(response.conversation_id)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::User);
        assert_eq!(messages[0].content, "hello");

        let stored: RecommendationPayload = serde_json::from_str(&messages[1].content).unwrap();
        assert_eq!(stored.message, "What mood are you in?");
    }

    #[tokio::test]
    async fn test_follow_up_turn_replays_history() {
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .withf(|turns| turns.len() == 1)
            .times(1)
            .returning(|_| Ok(r#"{"message": "Any genre?", "movies": []}"#.to_string()));
        generator
            .expect_generate()
            .withf(|turns| {
                turns.len() == 3
                    && turns[0] == ChatTurn::user("recommend something")
                    && turns[1] == ChatTurn::assistant("Any genre?")
                    && turns[2] == ChatTurn::user("thrillers")
            })
            .times(1)
            .returning(|_| Ok(r#"{"message": "Try Heat", "movies": []}"#.to_string()));
        let (service, _) = service_with(generator);

        let first = service
            .handle_turn(request("recommend something", None))
            .await
            .unwrap();
        let second = service
            .handle_turn(request("thrillers", Some(first.conversation_id)))
            .await
            .unwrap();

        assert_eq!(second.conversation_id, first.conversation_id);
        assert_eq!(second.message, "Try Heat");
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_not_found() {
        let (service, _) = service_with(MockGenerator::new());
        let result = service.handle_turn(request("hi", Some(999))).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let (service, _) = service_with(MockGenerator::new());
        let result = service.handle_turn(request("   ", None)).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_user_message() {
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .returning(|_| Err(AppError::Generation("unavailable".to_string())));
        let (service, conversations) = service_with(generator);

        let result = service.handle_turn(request("hello", None)).await;

        assert!(matches!(result, Err(AppError::Generation(_))));
        let messages = conversations.list_messages(1).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, ChatRole::User);
    }
}
