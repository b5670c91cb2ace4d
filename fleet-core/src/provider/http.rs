//! HTTP-backed [`ProviderBackend`] talking to an OpenAI-compatible server:
//! an `async_openai::Client<OpenAIConfig>` constructed with
//! `OpenAIConfig::with_api_base(base_url)`, one client per backend.

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use async_openai::types::CreateEmbeddingRequestArgs;
use async_openai::Client;
use async_trait::async_trait;
use tracing::debug;

use super::{ChatMessage, Metrics, ProviderBackend, ProviderError};

pub struct HttpProviderBackend {
    client: Client<OpenAIConfig>,
    base_url: String,
}

impl HttpProviderBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let config = OpenAIConfig::new().with_api_base(base_url.clone()).with_api_key("unused");
        Self { client: Client::with_config(config), base_url }
    }

    fn map_err(&self, e: impl std::fmt::Display) -> ProviderError {
        let message = e.to_string();
        // async-openai surfaces connection failures and 5xx/timeouts as the
        // same opaque error variant; a 4xx body that parsed still reaches us
        // here, so this coarse match is the best signal available without a
        // raw reqwest layer underneath.
        if message.contains("timed out") || message.contains("connection") || message.contains("error sending request") {
            ProviderError::BackendUnavailable(format!("{}: {}", self.base_url, message))
        } else {
            ProviderError::Transient(message)
        }
    }

    fn chat_request(model: &str, messages: &[ChatMessage]) -> Result<Vec<ChatCompletionRequestMessage>, ProviderError> {
        messages
            .iter()
            .map(|m| match m.role.as_str() {
                "system" => Ok(ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage::from(m.content.as_str()))),
                "user" => Ok(ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(m.content.as_str()))),
                "assistant" => Ok(ChatCompletionRequestMessage::Assistant((m.content.as_str()).into())),
                other => Err(ProviderError::BadRequest(format!("unsupported message role for model {model}: {other}"))),
            })
            .collect()
    }
}

#[async_trait]
impl ProviderBackend for HttpProviderBackend {
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<(String, Metrics), ProviderError> {
        let request_messages = Self::chat_request(model, messages)?;
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(model);
        args.messages(request_messages);
        let request = args.build().map_err(|e| ProviderError::BadRequest(e.to_string()))?;

        debug!(base_url = %self.base_url, model, "provider chat request");
        let response = self.client.chat().create(request).await.map_err(|e| self.map_err(e))?;
        let choice = response.choices.into_iter().next().ok_or_else(|| ProviderError::Transient("no choices in response".into()))?;
        let content = choice.message.content.unwrap_or_default();
        let metrics = response
            .usage
            .map(|u| Metrics { input_tokens: u.prompt_tokens, output_tokens: u.completion_tokens })
            .unwrap_or_default();
        Ok((content, metrics))
    }

    async fn prompt(&self, model: &str, prompt: &str) -> Result<(String, Metrics), ProviderError> {
        self.chat(model, &[ChatMessage::user(prompt)]).await
    }

    async fn embed(&self, model: &str, text: &str) -> Result<(Vec<f32>, Metrics), ProviderError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(model)
            .input(text)
            .build()
            .map_err(|e| ProviderError::BadRequest(e.to_string()))?;
        let response = self.client.embeddings().create(request).await.map_err(|e| self.map_err(e))?;
        let embedding = response.data.into_iter().next().ok_or_else(|| ProviderError::Transient("no embedding in response".into()))?;
        let metrics = Metrics { input_tokens: response.usage.prompt_tokens, output_tokens: 0 };
        Ok((embedding.embedding, metrics))
    }
}
