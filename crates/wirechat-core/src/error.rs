//! Error taxonomy shared by every layer of the adapter.
//!
//! Each failure class is a distinct variant so a caller can tell a broken
//! configuration from a bad response, a transport failure, or a failing
//! tool. Nothing here is ever downgraded to a default value.

use std::path::PathBuf;

use crate::provider::json_path::PathSyntaxError;
use crate::provider::types::FinishReason;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by the adapter, the tool manager and the agent loop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// `template` holds the line-numbered dump of the offending template.
    #[error("failed to process template: {message}\n{template}")]
    Template { message: String, template: String },

    #[error("transport error{}: {message}", status_suffix(.status))]
    Transport { status: Option<u16>, message: String },

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl Error {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    /// Whether the failure came from tool execution rather than the model call.
    pub fn is_tool_error(&self) -> bool {
        matches!(self, Self::Tool(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::transport(e.status().map(|s| s.as_u16()), e.to_string())
    }
}

/// Problems detected while loading or applying configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required parameter '{0}'")]
    Missing(&'static str),

    #[error("invalid JSON path for '{field}': {source}")]
    InvalidPath {
        field: &'static str,
        #[source]
        source: PathSyntaxError,
    },

    #[error(
        "exactly one of 'toolArgumentsDictPath' and 'toolArgumentsStringPath' must be set"
    )]
    ToolArgumentsPath,

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("finish reason '{0}' has no entry in the finish reason mapping")]
    UnmappedFinishReason(String),

    #[error("failed to read '{}': {reason}", .path.display())]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse '{}': {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("failed to write '{}': {reason}", .path.display())]
    Write { path: PathBuf, reason: String },
}

/// A response did not have the shape the configured paths describe.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    /// `prefix` is the shortest prefix of `path` that could not be resolved.
    #[error("failed to extract JSON path '{path}', error occurred when retrieving element '{prefix}': {reason}")]
    NotFound {
        path: String,
        prefix: String,
        reason: String,
    },

    #[error("JSON path '{path}' does not point to {expected} (found {found})")]
    WrongKind {
        path: String,
        expected: &'static str,
        found: String,
    },

    #[error("response body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("response carries neither an answer nor tool calls: {0}")]
    MissingAnswer(String),

    #[error("answer at '{path}' is empty and there are no tool calls (finish reason {finish_reason:?})")]
    EmptyAnswer {
        path: String,
        finish_reason: FinishReason,
    },

    #[error("finish reason is a tool call, but none of the {skipped} element(s) has the field named by '{path}'")]
    NoToolCalls { path: String, skipped: usize },

    #[error("invalid arguments for tool call '{tool}': {reason}")]
    InvalidToolArguments { tool: String, reason: String },
}

/// Failures of tool discovery or execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tools directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("the model referenced a nonexistent tool '{0}'")]
    UnknownTool(String),

    #[error("the model omitted the required argument '{parameter}' of tool '{tool}'")]
    MissingArgument { tool: String, parameter: String },

    #[error("invalid value for argument '{parameter}' of tool '{tool}': {reason}")]
    InvalidArgument {
        tool: String,
        parameter: String,
        reason: String,
    },

    #[error("the model returned invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("incorrect description for tool '{tool}': {reason}")]
    InvalidDescription { tool: String, reason: String },

    #[error("failed to execute tool '{tool}': {reason}")]
    Spawn { tool: String, reason: String },

    #[error("tool '{tool}' failed with {status}: {output}")]
    Failed {
        tool: String,
        status: String,
        output: String,
    },

    #[error("tool '{tool}' timed out after {seconds} seconds")]
    Timeout { tool: String, seconds: u64 },

    #[error("the model was still requesting tools after {0} rounds")]
    TooManyRounds(u32),
}
