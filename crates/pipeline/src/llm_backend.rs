//! HTTP language-model backend
//!
//! Speaks the OpenAI-compatible chat-completions dialect most local
//! inference servers expose.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use call_agent_core::{
    Error, GenerateRequest, GenerateResponse, LanguageModel, Message, Result, Role,
    ToolInvocation,
};

/// HTTP LLM configuration
#[derive(Debug, Clone)]
pub struct HttpLlmConfig {
    /// Base URL of the chat-completions service
    pub endpoint: String,
    /// Model identifier passed through to the service
    pub model: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Sampling temperature
    pub temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChatToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    function: ChatFunction,
}

#[derive(Debug, Deserialize)]
struct ChatFunction {
    name: String,
    /// JSON-encoded arguments object
    #[serde(default)]
    arguments: String,
}

/// Language model over HTTP.
pub struct HttpLlm {
    config: HttpLlmConfig,
    client: reqwest::Client,
}

impl HttpLlm {
    pub fn new(config: HttpLlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Llm(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn wire_messages(request: &GenerateRequest) -> Vec<serde_json::Value> {
        let mut messages = vec![json!({"role": "system", "content": request.system})];
        for Message { role, content } in &request.messages {
            let role = match role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            messages.push(json!({"role": role, "content": content}));
        }
        messages
    }
}

#[async_trait]
impl LanguageModel for HttpLlm {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        let tools: Vec<serde_json::Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        let mut body = json!({
            "model": self.config.model,
            "messages": Self::wire_messages(&request),
            "temperature": self.config.temperature,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Llm(format!(
                "completion rejected with status {}",
                response.status()
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("malformed completion: {e}")))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("completion carried no choices".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| {
                let arguments = if call.function.arguments.is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&call.function.arguments)
                        .unwrap_or_else(|_| json!({}))
                };
                ToolInvocation {
                    name: call.function.name,
                    arguments,
                }
            })
            .collect();

        let result = GenerateResponse {
            text: choice.message.content.filter(|s| !s.is_empty()),
            tool_calls,
        };
        if result.is_empty() {
            return Err(Error::Llm("completion carried no text or tool calls".into()));
        }
        Ok(result)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
