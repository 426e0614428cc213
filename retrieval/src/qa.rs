//! Retrieval-augmented answers.
//!
//! Retrieved segments are rendered as numbered excerpts and sent to a chat
//! model together with the learner's question.

use async_trait::async_trait;
use polyglot_embeddings::provider::DEFAULT_BASE_URL;
use polyglot_embeddings::{Segment, Usage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, RetrievalError};

/// Default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Default number of excerpts retrieved per question.
pub const DEFAULT_TOP_K: usize = 5;

const SYSTEM_PROMPT: &str = "You help a language learner understand a text they are studying. \
Answer using only the numbered excerpts provided. If the excerpts do not contain the answer, \
say so plainly. Reply in the language of the question and cite excerpts as [n].";

/// Configuration for question answering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaConfig {
    /// Chat model used to compose answers.
    pub chat_model: String,

    /// Excerpts retrieved per question.
    pub top_k: usize,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A model reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub content: String,
    pub model: String,
    pub usage: Usage,
}

/// Trait for chat-completion providers.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Send a conversation and return the model's reply.
    async fn complete(&self, messages: &[ChatMessage], model: &str) -> Result<ChatCompletion>;

    /// Check if the provider is usable.
    fn is_available(&self) -> bool;
}

/// OpenAI-compatible chat-completions provider.
pub struct OpenAIChatProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIChatProvider {
    /// Create a provider with no API key and the public OpenAI endpoint.
    pub fn new() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

impl Default for OpenAIChatProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatProvider for OpenAIChatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, messages: &[ChatMessage], model: &str) -> Result<ChatCompletion> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| RetrievalError::Config("OPENAI_API_KEY is not set".to_string()))?;

        debug!("Requesting chat completion with model: {model}");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&ChatRequest { model, messages })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Chat(format!("{status}: {error_text}")));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RetrievalError::Chat("response contained no choices".to_string()))?;
        let usage = parsed.usage.unwrap_or_default();

        info!(
            "Chat completion used {} tokens ({})",
            usage.total_tokens, parsed.model
        );

        Ok(ChatCompletion {
            content,
            model: parsed.model,
            usage,
        })
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    model: String,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

/// A retrieved excerpt, detached from the index it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSegment {
    /// Position in the index build.
    pub position: usize,

    /// Cosine similarity to the question.
    pub score: f32,

    /// The segment.
    pub segment: Segment,
}

/// An answer with the excerpts it was based on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub content: String,
    pub model: String,
    pub usage: Usage,
    pub sources: Vec<RetrievedSegment>,
}

/// Render `secs` as `m:ss`.
fn format_timestamp(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Render excerpts as a numbered list with provenance.
pub fn render_excerpts(sources: &[RetrievedSegment]) -> String {
    let mut out = String::new();
    for (n, source) in sources.iter().enumerate() {
        let metadata = source.segment.metadata();
        let mut label = Vec::new();
        if let Some(speaker) = &metadata.speaker {
            label.push(speaker.clone());
        }
        match (metadata.start_secs, metadata.end_secs) {
            (Some(start), Some(end)) => {
                label.push(format!("{}-{}", format_timestamp(start), format_timestamp(end)));
            }
            (Some(start), None) => label.push(format_timestamp(start)),
            _ => {}
        }

        out.push_str(&format!("[{}]", n + 1));
        if !label.is_empty() {
            out.push_str(&format!(" ({})", label.join(", ")));
        }
        out.push('\n');
        out.push_str(source.segment.text().trim());
        out.push_str("\n\n");
    }
    out
}

/// Compose the conversation sent to the chat model.
pub fn build_messages(question: &str, sources: &[RetrievedSegment]) -> Vec<ChatMessage> {
    let user = format!(
        "Excerpts:\n\n{}Question: {}",
        render_excerpts(sources),
        question.trim()
    );
    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}

/// Ask the chat model to answer `question` from `sources`.
pub async fn answer(
    chat: &dyn ChatProvider,
    model: &str,
    question: &str,
    sources: Vec<RetrievedSegment>,
) -> Result<Answer> {
    let messages = build_messages(question, &sources);
    let completion = chat.complete(&messages, model).await?;
    Ok(Answer {
        content: completion.content,
        model: completion.model,
        usage: completion.usage,
        sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyglot_embeddings::SegmentMetadata;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(position: usize, text: &str, metadata: SegmentMetadata) -> RetrievedSegment {
        RetrievedSegment {
            position,
            score: 0.5,
            segment: Segment::with_metadata(text, metadata).unwrap(),
        }
    }

    #[test]
    fn test_render_excerpts_with_provenance() {
        let sources = vec![
            source(
                3,
                " Wo ist der Bahnhof? ",
                SegmentMetadata {
                    start_secs: Some(65.0),
                    end_secs: Some(71.4),
                    speaker: Some("Speaker A".to_string()),
                    ..Default::default()
                },
            ),
            source(0, "Geradeaus.", SegmentMetadata::default()),
        ];

        assert_eq!(
            render_excerpts(&sources),
            "[1] (Speaker A, 1:05-1:11)\nWo ist der Bahnhof?\n\n[2]\nGeradeaus.\n\n"
        );
    }

    #[test]
    fn test_build_messages() {
        let sources = vec![source(0, "Paris is the capital of France.", SegmentMetadata::default())];
        let messages = build_messages("  What is the capital? ", &sources);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(
            messages[1].content,
            "Excerpts:\n\n[1]\nParis is the capital of France.\n\nQuestion: What is the capital?"
        );
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let value = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(value, json!({ "role": "user", "content": "hi" }));
    }

    #[tokio::test]
    async fn test_openai_chat_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({ "model": "gpt-4o-mini" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [{ "message": { "role": "assistant", "content": "Paris [1]" } }],
                "usage": { "prompt_tokens": 40, "completion_tokens": 3, "total_tokens": 43 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let chat = OpenAIChatProvider::new()
            .with_api_key("sk-test")
            .with_base_url(server.uri());
        let sources = vec![source(1, "Paris is the capital of France.", SegmentMetadata::default())];

        let answer = answer(&chat, DEFAULT_CHAT_MODEL, "Capital?", sources)
            .await
            .unwrap();
        assert_eq!(answer.content, "Paris [1]");
        assert_eq!(answer.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(answer.usage.total_tokens, 43);
        assert_eq!(answer.sources[0].position, 1);
    }

    #[tokio::test]
    async fn test_openai_chat_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let chat = OpenAIChatProvider::new()
            .with_api_key("sk-wrong")
            .with_base_url(server.uri());
        let err = chat
            .complete(&[ChatMessage::user("hi")], DEFAULT_CHAT_MODEL)
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Chat(message) if message.contains("401")));
    }

    #[tokio::test]
    async fn test_openai_chat_requires_key() {
        let err = OpenAIChatProvider::new()
            .complete(&[ChatMessage::user("hi")], DEFAULT_CHAT_MODEL)
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));
    }
}
