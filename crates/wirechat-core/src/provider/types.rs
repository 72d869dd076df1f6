//! Conversation types shared by the adapter, the tool manager and the agent loop.
//!
//! These types are vendor-neutral: every backend request is rendered from a
//! list of `MessageRound`s and every backend response is parsed into a
//! `ChatResponse`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ExtractionError;
use crate::provider::json_path::kind_of;

// ── Roles ───────────────────────────────────────────────────────────

/// Author of a message round. Templates see the upper-case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    System,
    User,
    Model,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "SYSTEM",
            Self::User => "USER",
            Self::Model => "MODEL",
            Self::Tool => "TOOL",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Tool parameters ─────────────────────────────────────────────────

/// Declared type of a tool parameter. Templates see the lower-case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ToolParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ToolParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolParameterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            other => Err(format!("'{}' is not a supported tool argument type", other)),
        }
    }
}

/// A JSON value that does not fit the requested parameter type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, got {found}")]
pub struct ValueMismatch {
    pub expected: &'static str,
    pub found: &'static str,
}

/// A typed scalar passed to a tool. The tag always matches the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ToolParameterValue {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
}

impl ToolParameterValue {
    /// Build a value of type `kind` from a JSON node, rejecting mismatches.
    /// Integral JSON numbers are accepted for `number`.
    pub fn from_json(kind: ToolParameterType, value: &Value) -> Result<Self, ValueMismatch> {
        let converted = match (kind, value) {
            (ToolParameterType::String, Value::String(s)) => Some(Self::String(s.clone())),
            (ToolParameterType::Integer, Value::Number(n)) => n.as_i64().map(Self::Integer),
            (ToolParameterType::Number, Value::Number(n)) => n.as_f64().map(Self::Number),
            (ToolParameterType::Boolean, Value::Bool(b)) => Some(Self::Boolean(*b)),
            _ => None,
        };
        converted.ok_or(ValueMismatch {
            expected: kind.as_str(),
            found: kind_of(value),
        })
    }

    /// Derive the type from a JSON scalar. Null, arrays and objects are rejected.
    pub fn infer(value: &Value) -> Result<Self, ValueMismatch> {
        let inferred = match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Bool(b) => Some(Self::Boolean(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Integer(i)),
                None => n.as_f64().map(Self::Number),
            },
            _ => None,
        };
        inferred.ok_or(ValueMismatch {
            expected: "a scalar",
            found: kind_of(value),
        })
    }

    pub fn kind(&self) -> ToolParameterType {
        match self {
            Self::String(_) => ToolParameterType::String,
            Self::Integer(_) => ToolParameterType::Integer,
            Self::Number(_) => ToolParameterType::Number,
            Self::Boolean(_) => ToolParameterType::Boolean,
        }
    }

    /// Text passed on a tool's command line.
    pub fn to_argument(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => other.to_json_literal(),
        }
    }

    /// JSON literal: quoted and escaped for strings, bare otherwise.
    pub fn to_json_literal(&self) -> String {
        match self {
            Self::String(s) => Value::String(s.clone()).to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Number(n) => Value::from(*n).to_string(),
            Self::Boolean(b) => b.to_string(),
        }
    }
}

// ── Tool calls and specifications ───────────────────────────────────

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool_name: String,
    pub call_id: Option<String>,
    /// Arguments in the order the vendor sent them.
    pub parameters: Vec<(String, ToolParameterValue)>,
    /// Compact JSON text of the arguments object.
    pub arguments: String,
}

impl ToolCall {
    pub fn from_arguments(
        tool_name: impl Into<String>,
        call_id: Option<String>,
        arguments: &Map<String, Value>,
    ) -> Result<Self, ExtractionError> {
        let tool_name = tool_name.into();
        let parameters = arguments
            .iter()
            .map(|(name, value)| {
                ToolParameterValue::infer(value)
                    .map(|v| (name.clone(), v))
                    .map_err(|e| ExtractionError::InvalidToolArguments {
                        tool: tool_name.clone(),
                        reason: format!("parameter '{}': {}", name, e),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            arguments: Value::Object(arguments.clone()).to_string(),
            tool_name,
            call_id,
            parameters,
        })
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ToolParameterType,
    pub required: bool,
}

/// Callable signature of a tool, as advertised to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpecification {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolSpecification {
    pub fn required_parameters(&self) -> impl Iterator<Item = &ToolParameter> {
        self.parameters.iter().filter(|p| p.required)
    }
}

// ── Message rounds ──────────────────────────────────────────────────

/// One entry of the conversation.
///
/// A `Model` round always carries non-empty text, at least one tool call, or
/// both. `None` and `Some("")` content are kept distinct.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRound {
    role: Role,
    content: Option<String>,
    tool_calls: Vec<ToolCall>,
    tool_name: Option<String>,
    tool_call_id: Option<String>,
}

impl MessageRound {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_name: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    /// Returns `None` when the round would have neither text nor tool calls.
    pub fn model(content: Option<String>, tool_calls: Vec<ToolCall>) -> Option<Self> {
        let has_text = content.as_deref().is_some_and(|c| !c.is_empty());
        if !has_text && tool_calls.is_empty() {
            return None;
        }
        Some(Self {
            role: Role::Model,
            content,
            tool_calls,
            tool_name: None,
            tool_call_id: None,
        })
    }

    pub fn tool_result(
        tool_name: impl Into<String>,
        tool_call_id: Option<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: Some(output.into()),
            tool_calls: Vec::new(),
            tool_name: Some(tool_name.into()),
            tool_call_id,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.tool_calls
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.tool_name.as_deref()
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        self.tool_call_id.as_deref()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ── Responses ───────────────────────────────────────────────────────

/// Normalized reason a model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    Done,
    MaxTokens,
    ToolCall,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        u64::from(self.input) + u64::from(self.output)
    }
}

/// Response from a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub message: MessageRound,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
}

impl ChatResponse {
    pub fn text(&self) -> Option<&str> {
        self.message.content()
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        self.message.tool_calls()
    }
}
