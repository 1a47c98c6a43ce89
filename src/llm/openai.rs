//! OpenAI-compatible chat-completions provider over `reqwest`.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, ChoiceRequest, ChoiceResponse, CompletionRequest, CompletionResponse,
    FinishReason, LlmProvider, Role, ToolCall, ToolCompletionRequest, ToolCompletionResponse,
    ToolDefinition,
};

const PROVIDER: &str = "openai";

/// Client for any endpoint speaking the OpenAI chat-completions protocol.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: SecretString, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    async fn send(&self, body: serde_json::Value) -> Result<WireResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(LlmError::AuthFailed {
                provider: PROVIDER.to_string(),
            });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited {
                provider: PROVIDER.to_string(),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("HTTP {status}: {text}"),
            });
        }

        response
            .json::<WireResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })
    }

    fn base_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": messages.iter().map(WireMessage::from).collect::<Vec<_>>(),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut body = self.base_body(&request.messages);
        apply_sampling(&mut body, request.max_tokens, request.temperature);

        let response = self.send(body).await?;
        let (message, finish_reason, usage) = response.into_parts()?;
        Ok(CompletionResponse {
            content: message.content.unwrap_or_default(),
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            finish_reason,
        })
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let mut body = self.base_body(&request.messages);
        apply_sampling(&mut body, request.max_tokens, request.temperature);
        if !request.tools.is_empty() {
            body["tools"] = json!(request.tools.iter().map(wire_tool).collect::<Vec<_>>());
        }

        let response = self.send(body).await?;
        let (message, finish_reason, usage) = response.into_parts()?;
        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(WireToolCall::into_tool_call)
            .collect();

        Ok(ToolCompletionResponse {
            content: message.content.filter(|c| !c.is_empty()),
            tool_calls,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            finish_reason,
        })
    }

    async fn complete_choice(&self, request: ChoiceRequest) -> Result<ChoiceResponse, LlmError> {
        let mut body = self.base_body(&request.messages);
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": "route_response",
                "strict": true,
                "schema": {
                    "type": "object",
                    "properties": {
                        "next": { "type": "string", "enum": request.options }
                    },
                    "required": ["next"],
                    "additionalProperties": false
                }
            }
        });

        let response = self.send(body).await?;
        let (message, _, usage) = response.into_parts()?;
        let raw = message.content.unwrap_or_default();
        Ok(ChoiceResponse {
            choice: parse_choice(&raw),
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        })
    }
}

fn apply_sampling(body: &mut serde_json::Value, max_tokens: Option<u32>, temperature: Option<f32>) {
    if let Some(max_tokens) = max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = temperature {
        body["temperature"] = json!(temperature);
    }
}

/// Extract `next` from a structured answer, falling back to the raw text
/// untouched so the router validates exactly what the model said.
fn parse_choice(raw: &str) -> String {
    #[derive(Deserialize)]
    struct Route {
        next: String,
    }
    match serde_json::from_str::<Route>(raw) {
        Ok(route) => route.next,
        Err(_) => raw.to_string(),
    }
}

fn wire_tool(def: &ToolDefinition) -> serde_json::Value {
    json!({
        "type": "function",
        "function": {
            "name": def.name,
            "description": def.description,
            "parameters": def.parameters,
        }
    })
}

// ── Wire format ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<serde_json::Value>,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(msg: &'a ChatMessage) -> Self {
        Self {
            role: msg.role,
            content: &msg.content,
            // tool messages are identified by tool_call_id only
            name: match msg.role {
                Role::Tool => None,
                _ => msg.name.as_deref(),
            },
            tool_call_id: msg.tool_call_id.as_deref(),
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    })
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: WireUsage,
}

impl WireResponse {
    fn into_parts(self) -> Result<(WireAssistant, FinishReason, WireUsage), LlmError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "response contained no choices".to_string(),
            })?;
        let finish = match choice.finish_reason.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("tool_calls") => FinishReason::ToolUse,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        };
        Ok((choice.message, finish, self.usage))
    }
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireAssistant,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireAssistant {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

impl WireToolCall {
    fn into_tool_call(self) -> ToolCall {
        // Unparseable arguments are passed through as a string; the tool
        // rejects them as invalid parameters and the model sees the error.
        let arguments = serde_json::from_str(&self.function.arguments)
            .unwrap_or(serde_json::Value::String(self.function.arguments));
        ToolCall {
            id: self.id,
            name: self.function.name,
            arguments,
        }
    }
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}
