pub mod parse;

use std::time::Instant;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LlmConfig;
use crate::error::{ApiError, ParseError};
use crate::model::chat::{ChatMessage, ChatRole, ChatSession};
use crate::model::work_item::{count_by_kind, IssueKind, WorkItem};

pub const DEFAULT_GENERATOR_PROMPT: &str = r#"You turn software requirements into a hierarchy of JIRA issues.

Rules:
1. Produce several items of every type: 2-4 Epics for the major objectives, 5-10 Stories under them, 6-12 Tasks implementing the Stories and 8-15 Sub-tasks breaking the Tasks down.
2. Link each item to its owner through the "parent" field, which must repeat the owner's summary exactly:
   - Stories point at an Epic
   - Tasks point at a Story
   - Sub-tasks point at a Task
   Epics have no parent.
3. Summaries must be unique, short and specific. Descriptions must be actionable with a clear definition of done.
4. Spread priorities across High, Medium and Low, and add labels for the area each item touches (Frontend, Backend, Database, Integration, ...).
5. Use the domain's own vocabulary and refer to concrete requirements from the input.

Answer with a single JSON array and nothing else, each element shaped like:
{
  "type": "Epic|Story|Task|Sub-task",
  "summary": "Brief summary",
  "description": "Detailed description",
  "priority": "Highest|High|Medium|Low|Lowest",
  "parent": "Summary of the owning item",
  "labels": ["Backend"]
}"#;

pub const CHAT_SYSTEM_PROMPT: &str = "You are a requirements analyst. Help the user clarify, \
structure and prioritise software requirements. Ask a direct question when something is ambiguous. \
Keep answers concise.";

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Everything produced by one generation call, kept for display and export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub query: String,
    pub system_prompt: String,
    pub raw_response: String,
    pub items: Vec<WorkItem>,
    pub processed_at: String,
    pub model: String,
    pub tokens_used: Option<u32>,
    pub processing_time_ms: u64,
}

impl GenerationResult {
    pub fn type_counts(&self) -> [(IssueKind, usize); 4] {
        count_by_kind(&self.items)
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: ChatRole,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: Option<u32>,
}

struct Completion {
    content: String,
    tokens_used: Option<u32>,
}

/// Client for an OpenAI-style chat-completions endpoint.
pub struct LlmClient {
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    system_prompt: String,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: crate::config::DEFAULT_LLM_MODEL.to_string(),
            temperature: 0.3,
            top_p: 1.0,
            max_tokens: 2000,
            system_prompt: DEFAULT_GENERATOR_PROMPT.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let Some(api_key) = config.api_key.clone().filter(|k| !k.is_empty()) else {
            bail!("No LLM API key configured. Set [llm] api_key in ~/.reqjira/config.toml or REQJIRA_LLM_API_KEY");
        };
        let mut client = Self::new(config.api_url(), api_key);
        client.model = config.model().to_string();
        if let Some(t) = config.temperature {
            client.temperature = t;
        }
        if let Some(p) = config.top_p {
            client.top_p = p;
        }
        if let Some(m) = config.max_tokens {
            client.max_tokens = m;
        }
        if let Some(prompt) = &config.system_prompt {
            client.system_prompt = prompt.clone();
        }
        Ok(client)
    }

    async fn complete(&self, messages: Vec<WireMessage<'_>>) -> Result<Completion, ApiError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
        };

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = resp.json().await?;
        let tokens_used = parsed.usage.and_then(|u| u.total_tokens);
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Malformed("completion has no choices".into()))?;

        Ok(Completion {
            content: choice.message.content,
            tokens_used,
        })
    }

    /// Ask the model to break `requirements` into work items.
    pub async fn generate_items(&self, requirements: &str) -> Result<GenerationResult, GenerateError> {
        let started = Instant::now();
        let user_prompt = format!("Generate JIRA items based on these requirements: {requirements}");
        let messages = vec![
            WireMessage {
                role: ChatRole::System,
                content: &self.system_prompt,
            },
            WireMessage {
                role: ChatRole::User,
                content: &user_prompt,
            },
        ];

        let completion = self.complete(messages).await?;
        let items = parse::parse_items(&completion.content)?;
        tracing::info!(count = items.len(), model = %self.model, "generated work items");

        Ok(GenerationResult {
            query: requirements.to_string(),
            system_prompt: self.system_prompt.clone(),
            raw_response: completion.content,
            items,
            processed_at: chrono::Utc::now().to_rfc3339(),
            model: self.model.clone(),
            tokens_used: completion.tokens_used,
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Run one chat turn. The session is only extended when the model answers.
    pub async fn chat(&self, session: &mut ChatSession, message: &str) -> Result<String, ApiError> {
        let mut messages = vec![WireMessage {
            role: ChatRole::System,
            content: CHAT_SYSTEM_PROMPT,
        }];
        messages.extend(
            session
                .messages
                .iter()
                .filter(|m| m.role != ChatRole::System)
                .map(|m| WireMessage {
                    role: m.role,
                    content: &m.content,
                }),
        );
        messages.push(WireMessage {
            role: ChatRole::User,
            content: message,
        });

        let completion = self.complete(messages).await?;
        session.push(ChatMessage::user(message));
        session.push(ChatMessage::assistant(completion.content.clone()));
        Ok(completion.content)
    }
}
