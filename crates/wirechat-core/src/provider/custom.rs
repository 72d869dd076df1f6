//! Configurable adapter for any JSON-over-HTTP chat backend.
//!
//! One implementation covers every vendor whose request body can be written
//! as a Handlebars template and whose response fields can be located with
//! [`JsonPath`] expressions:
//!
//! - OpenAI-style chat completions (`choices[0].message.content`, string arguments)
//! - Gemini `generateContent` (`candidates[0].content.parts[0].text`, object arguments)
//! - self-hosted servers with their own shapes
//!
//! Nothing is guessed: an unmapped finish reason, a missing field or a
//! non-2xx status is reported to the caller as an error.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use super::json_path::{kind_of, JsonPath, Segment};
use super::payload::{PayloadGenerator, TemplateContext};
use super::types::{
    ChatResponse, FinishReason, MessageRound, TokenUsage, ToolCall, ToolSpecification,
};
use super::LlmProvider;
use crate::error::{ConfigError, Error, ExtractionError, Result};

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

// ── Configuration ───────────────────────────────────────────────────

/// Where the arguments of a tool call live, and how they are encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolArgumentsPath {
    /// A JSON object keyed by parameter name.
    Dict(JsonPath),
    /// A string holding a serialized JSON object.
    String(JsonPath),
}

impl ToolArgumentsPath {
    /// Exactly one of the two locations must be given.
    pub fn from_options(
        dict: Option<JsonPath>,
        string: Option<JsonPath>,
    ) -> std::result::Result<Self, ConfigError> {
        match (dict, string) {
            (Some(path), None) => Ok(Self::Dict(path)),
            (None, Some(path)) => Ok(Self::String(path)),
            _ => Err(ConfigError::ToolArgumentsPath),
        }
    }
}

/// Validated, immutable settings of one adapter instance.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub model_name: String,
    pub api_key: String,
    pub base_url: String,
    pub payload_template: String,
    /// Header name and value template, in sending order.
    pub http_headers: Vec<(String, String)>,
    pub answer_path: JsonPath,
    pub input_token_path: JsonPath,
    pub output_token_path: JsonPath,
    pub finish_reason_path: JsonPath,
    pub finish_reason_mappings: BTreeMap<String, FinishReason>,
    pub tool_calls_path: JsonPath,
    pub tool_name_path: JsonPath,
    pub tool_call_id_path: Option<JsonPath>,
    pub tool_arguments_path: ToolArgumentsPath,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

impl AdapterConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.model_name.trim().is_empty() {
            return Err(ConfigError::Missing("modelName"));
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("url"));
        }
        Url::parse(&self.base_url).map_err(|e| ConfigError::Invalid {
            field: "url".into(),
            reason: e.to_string(),
        })?;
        if self.payload_template.trim().is_empty() {
            return Err(ConfigError::Missing("payloadTemplate"));
        }
        if self.finish_reason_mappings.is_empty() {
            return Err(ConfigError::Missing("finishReasonMappings"));
        }
        Ok(())
    }
}

// ── Vendor error bodies ─────────────────────────────────────────────

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

fn vendor_error_message(body: &str) -> String {
    if let Ok(err) = serde_json::from_str::<ErrorResponse>(body) {
        return err.error.message;
    }
    body.trim().to_string()
}

// ── Provider ────────────────────────────────────────────────────────

/// A rendered request, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRequest {
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Provider driven entirely by an [`AdapterConfig`].
#[derive(Debug)]
pub struct CustomProvider {
    client: Client,
    config: AdapterConfig,
    generator: PayloadGenerator,
}

impl CustomProvider {
    /// Validate the configuration, compile its templates and build an HTTP
    /// client with the configured timeouts.
    pub fn new(config: AdapterConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()?;
        Self::with_client(config, client)
    }

    pub fn with_client(config: AdapterConfig, client: Client) -> Result<Self> {
        config.validate()?;
        let generator = PayloadGenerator::new(&config.payload_template, &config.http_headers)?;

        debug!(
            model = %config.model_name,
            url = %config.base_url,
            headers = config.http_headers.len(),
            "Initialized custom provider"
        );

        Ok(Self {
            client,
            config,
            generator,
        })
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Render the headers and body for one turn.
    pub fn build_request(
        &self,
        messages: &[MessageRound],
        tools: &[ToolSpecification],
    ) -> Result<RenderedRequest> {
        let context = TemplateContext::new(
            messages,
            &self.config.model_name,
            tools,
            &self.config.api_key,
        );
        Ok(RenderedRequest {
            headers: self.generator.render_headers(&context)?,
            body: self.generator.render_body(&context)?,
        })
    }

    /// Turn a response body into a [`ChatResponse`].
    pub fn parse_response(&self, body: &str) -> Result<ChatResponse> {
        let root: Value = serde_json::from_str(body)
            .map_err(|e| ExtractionError::InvalidJson(e.to_string()))?;

        let (tool_calls, skipped) = self.extract_tool_calls(&root)?;

        let usage = TokenUsage {
            input: self.config.input_token_path.extract_u32(&root)?,
            output: self.config.output_token_path.extract_u32(&root)?,
        };

        let raw_reason = self.config.finish_reason_path.extract_text(&root)?;
        let finish_reason = *self
            .config
            .finish_reason_mappings
            .get(&raw_reason)
            .ok_or(ConfigError::UnmappedFinishReason(raw_reason))?;

        if tool_calls.is_empty() && skipped > 0 && finish_reason == FinishReason::ToolCall {
            return Err(ExtractionError::NoToolCalls {
                path: self.config.tool_name_path.to_string(),
                skipped,
            }
            .into());
        }

        let text = self.extract_answer(&root, !tool_calls.is_empty())?;
        let message = match text {
            Some(text) if text.is_empty() && tool_calls.is_empty() => {
                return Err(ExtractionError::EmptyAnswer {
                    path: self.config.answer_path.to_string(),
                    finish_reason,
                }
                .into())
            }
            text => MessageRound::model(text, tool_calls).ok_or_else(|| {
                ExtractionError::MissingAnswer(self.config.answer_path.to_string())
            })?,
        };

        Ok(ChatResponse {
            message,
            usage,
            finish_reason,
        })
    }

    /// The answer may be absent or null only when tool calls are present.
    fn extract_answer(&self, root: &Value, has_tool_calls: bool) -> Result<Option<String>> {
        let path = &self.config.answer_path;
        match path.extract(root) {
            Ok(Value::Null) => Ok(None),
            Ok(Value::String(s)) => Ok(Some(s.clone())),
            Ok(v @ (Value::Number(_) | Value::Bool(_))) => Ok(Some(v.to_string())),
            Ok(other) => Err(ExtractionError::WrongKind {
                path: path.to_string(),
                expected: "a scalar",
                found: kind_of(other).to_string(),
            }
            .into()),
            Err(_) if has_tool_calls => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the calls and the number of elements skipped for lacking the
    /// first field of the tool name path.
    fn extract_tool_calls(&self, root: &Value) -> Result<(Vec<ToolCall>, usize)> {
        let path = &self.config.tool_calls_path;
        let items = match path.extract(root) {
            Ok(Value::Array(items)) => items,
            Ok(Value::Null) | Err(ExtractionError::NotFound { .. }) => return Ok((Vec::new(), 0)),
            Ok(other) => {
                return Err(ExtractionError::WrongKind {
                    path: path.to_string(),
                    expected: "an array",
                    found: kind_of(other).to_string(),
                }
                .into())
            }
            Err(e) => return Err(e.into()),
        };

        let mut calls = Vec::with_capacity(items.len());
        let mut skipped = 0usize;
        for (index, item) in items.iter().enumerate() {
            // Mixed arrays (e.g. text parts next to function calls) are allowed.
            if !starts_with_field(&self.config.tool_name_path, item) {
                debug!(
                    index,
                    tool_calls_path = %path,
                    tool_name_path = %self.config.tool_name_path,
                    "Skipping element without a tool name"
                );
                skipped += 1;
                continue;
            }
            calls.push(self.extract_tool_call(item)?);
        }
        Ok((calls, skipped))
    }

    fn extract_tool_call(&self, item: &Value) -> Result<ToolCall> {
        let name = self.config.tool_name_path.extract_text(item)?;
        let call_id = self
            .config
            .tool_call_id_path
            .as_ref()
            .map(|p| p.extract_text(item))
            .transpose()?;

        let call = match &self.config.tool_arguments_path {
            ToolArgumentsPath::Dict(path) => {
                ToolCall::from_arguments(name, call_id, path.extract_object(item)?)?
            }
            ToolArgumentsPath::String(path) => {
                let text = path.extract_text(item)?;
                let arguments = parse_arguments(&name, &text)?;
                ToolCall::from_arguments(name, call_id, &arguments)?
            }
        };
        Ok(call)
    }
}

fn starts_with_field(path: &JsonPath, item: &Value) -> bool {
    match path.segments().first() {
        Some(Segment::Field(name)) => item.get(name).is_some(),
        _ => true,
    }
}

fn parse_arguments(tool: &str, text: &str) -> std::result::Result<Map<String, Value>, ExtractionError> {
    if text.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ExtractionError::InvalidToolArguments {
            tool: tool.to_string(),
            reason: format!("expected a JSON object, got {}", kind_of(&other)),
        }),
        Err(e) => Err(ExtractionError::InvalidToolArguments {
            tool: tool.to_string(),
            reason: e.to_string(),
        }),
    }
}

// ── LlmProvider implementation ──────────────────────────────────────

#[async_trait]
impl LlmProvider for CustomProvider {
    async fn chat(
        &self,
        messages: &[MessageRound],
        tools: &[ToolSpecification],
    ) -> Result<ChatResponse> {
        let request = self.build_request(messages, tools)?;

        debug!(
            url = %self.config.base_url,
            headers = ?request.headers.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            msg_count = messages.len(),
            tool_count = tools.len(),
            "Sending chat request"
        );
        debug!(body = %request.body, "Request body");

        let mut builder = self.client.post(&self.config.base_url);
        if !request
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()))
        {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.body(request.body).send().await?;
        let status = response.status();
        let body = response.text().await?;

        trace!(status = status.as_u16(), body = %body, "Received response body");

        if !status.is_success() {
            let message = vendor_error_message(&body);
            let message = if message.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                message
            };
            return Err(Error::transport(Some(status.as_u16()), message));
        }

        let response = self.parse_response(&body)?;

        debug!(
            finish_reason = ?response.finish_reason,
            tool_calls = response.tool_calls().len(),
            tokens = response.usage.total(),
            "Received model response"
        );

        Ok(response)
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}
