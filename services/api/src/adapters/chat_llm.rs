//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the completion provider.
//! It implements the `CompletionService` port from the `core` crate on top of
//! an OpenAI-compatible streaming chat-completion API.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;

use chat_core::domain::{ChatRole, ChatTurn};
use chat_core::ports::{CompletionService, FragmentStream, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CompletionService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChatAdapter {
    /// Creates a new `OpenAiChatAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// Maps the rolling history plus the new message into provider request messages.
    fn build_messages(
        message: &str,
        history: &[ChatTurn],
    ) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        let mut messages = Vec::with_capacity(history.len() + 1);

        for turn in history {
            let text = turn.text();
            let request_message = match turn.role {
                ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(text)
                    .build()?
                    .into(),
                ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(text)
                    .build()?
                    .into(),
            };
            messages.push(request_message);
        }

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(message.to_string())
                .build()?
                .into(),
        );

        Ok(messages)
    }
}

//=========================================================================================
// `CompletionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CompletionService for OpenAiChatAdapter {
    /// Streams the provider's answer to one composed message. The rolling
    /// history is replayed to the provider on every call; nothing about the
    /// conversation is stored at the provider layer.
    async fn generate(&self, message: &str, history: &[ChatTurn]) -> PortResult<FragmentStream> {
        let messages = Self::build_messages(message, history)
            .map_err(|e| PortError::Gateway(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(1.0)
            .top_p(0.95)
            .stream(true)
            .build()
            .map_err(|e| PortError::Gateway(e.to_string()))?;

        let mut upstream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e: OpenAIError| PortError::Gateway(e.to_string()))?;

        let fragments = stream! {
            while let Some(chunk) = upstream.next().await {
                match chunk {
                    Ok(response) => {
                        for choice in response.choices {
                            if let Some(content) = choice.delta.content {
                                if !content.is_empty() {
                                    yield Ok(content);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        // Terminal: no fragment follows a provider error.
                        yield Err(PortError::Gateway(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(fragments))
    }
}
