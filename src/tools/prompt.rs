//! `rewrite_prompt_for_llm`: one chat-completion round trip against an
//! OpenAI-compatible endpoint.

use super::{parse_args, schema_for, Tool, ToolError};
use crate::config::{LlmConfig, LLM_API_KEY_ENV};
use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const SYSTEM_INSTRUCTION: &str = "Rewrite the user's prompt so a large language model can act on it \
well. Keep the original intent, state the software-development focus explicitly, and ask for \
thorough, precise, expert-level answers. Reply with the rewritten prompt only.";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RewriteArgs {
    /// The human-written prompt to be rewritten.
    pub human_prompt: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn into_content(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|c| c.message.content)
    }
}

pub struct RewritePromptTool {
    config: LlmConfig,
    client: Client,
}

impl RewritePromptTool {
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("falling back to default HTTP client: {e}");
                Client::new()
            });
        Self { config, client }
    }

    async fn complete(&self, api_key: &str, prompt: &str) -> Result<String, ToolError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_INSTRUCTION,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ToolError::Execution(format!("LLM API error ({status}): {body}")));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .into_content()
            .ok_or_else(|| ToolError::Execution("LLM API returned no choices".into()))
    }
}

#[async_trait]
impl Tool for RewritePromptTool {
    fn name(&self) -> &str {
        "rewrite_prompt_for_llm"
    }

    fn description(&self) -> &str {
        "Rewrites a human prompt to enhance clarity and effectiveness for a Large Language Model (LLM)."
    }

    fn input_schema(&self) -> Value {
        schema_for::<RewriteArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: RewriteArgs = parse_args(args)?;
        if args.human_prompt.is_empty() {
            return Err(ToolError::invalid("human_prompt is required"));
        }
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ToolError::Execution(format!("{LLM_API_KEY_ENV} environment variable not set."))
            })?;

        tracing::debug!(model = %self.config.model, "requesting prompt rewrite");
        let rewritten = self.complete(api_key, &args.human_prompt).await?;

        Ok(json!({
            "original_prompt": args.human_prompt,
            "rewritten_prompt": rewritten,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_api_key_is_reported() {
        let tool = RewritePromptTool::new(LlmConfig::default());
        let err = tool
            .execute(json!({"human_prompt": "make it better"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("OPENROUTER_API_KEY"));
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected() {
        let tool = RewritePromptTool::new(LlmConfig {
            api_key: Some("sk-test".into()),
            ..LlmConfig::default()
        });
        let err = tool.execute(json!({"human_prompt": ""})).await.unwrap_err();
        assert_eq!(err.to_string(), "human_prompt is required");
    }

    #[test]
    fn request_body_has_system_and_user_messages() {
        let request = ChatRequest {
            model: "m",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_INSTRUCTION,
                },
                ChatMessage {
                    role: "user",
                    content: "hi",
                },
            ],
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["model"], "m");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn response_content_is_first_choice() {
        let parsed: ChatResponse = serde_json::from_value(json!({
            "id": "x",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "better prompt"}},
                {"index": 1, "message": {"role": "assistant", "content": "other"}}
            ]
        }))
        .unwrap();
        assert_eq!(parsed.into_content().as_deref(), Some("better prompt"));

        let empty: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(empty.into_content().is_none());
    }
}
