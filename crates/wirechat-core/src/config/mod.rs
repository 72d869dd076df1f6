//! Configuration module for wirechat.
//!
//! Loads typed configuration from `~/.wirechat/config.json` and model
//! descriptions from standalone JSON model files. All fields use `serde`
//! with camelCase keys.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::provider::custom::{
    AdapterConfig, ToolArgumentsPath, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS,
};
use crate::provider::json_path::JsonPath;
use crate::provider::types::FinishReason;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Inline model description. Takes precedence over `model_file`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfig>,
    /// Path to a model file, `~` is expanded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_file: Option<String>,
    pub agents: AgentsConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Load configuration.
    ///
    /// Priority:
    /// 1. local `config.json` in current directory
    /// 2. `~/.wirechat/config.json`
    ///
    /// Without either file the defaults are returned.
    pub fn load() -> Result<Self> {
        let paths = [PathBuf::from("config.json"), Self::default_path()];

        for path in paths {
            if path.exists() {
                tracing::debug!("Loading config from: {}", path.display());
                return Self::load_from(&path);
            }
        }

        Ok(Config::default())
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        Ok(read_json(path)?)
    }

    /// Get the default config directory path (`~/.wirechat`).
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".wirechat")
    }

    /// Get the default config file path (`~/.wirechat/config.json`).
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// The model description: inline if present, else read from `model_file`.
    pub fn model_config(&self) -> Result<Option<ModelConfig>> {
        if let Some(model) = &self.model {
            return Ok(Some(model.clone()));
        }
        match &self.model_file {
            Some(file) => Ok(Some(ModelConfig::load_from(&expand_home(file))?)),
            None => Ok(None),
        }
    }

    /// Write the default config template (and an empty tools directory) to
    /// `~/.wirechat`.
    pub fn write_default_template() -> Result<PathBuf> {
        let path = Self::default_path();
        let dir = Self::config_dir();
        let tools_dir = dir.join("tools");
        std::fs::create_dir_all(&tools_dir).map_err(|e| ConfigError::Write {
            path: tools_dir.clone(),
            reason: e.to_string(),
        })?;

        let template = Config {
            model: Some(ModelConfig::openai_example()),
            model_file: None,
            agents: AgentsConfig::default(),
            tools: ToolsConfig {
                dir: Some("~/.wirechat/tools".into()),
                ..ToolsConfig::default()
            },
        };

        let text = serde_json::to_string_pretty(&template).map_err(|e| ConfigError::Write {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        std::fs::write(&path, text).map_err(|e| ConfigError::Write {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(path)
    }

    /// Validate configuration and return actionable error messages.
    ///
    /// Checks that:
    /// - a model is configured and its paths and templates are well-formed
    /// - the API key environment variable is set
    /// - window sizes and the tool timeout are positive
    /// - the tools directory exists, when one is configured
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match self.model_config() {
            Ok(Some(model)) => {
                if let Err(e) = model.resolve() {
                    errors.push(format!("model: {}", e));
                }
            }
            Ok(None) => errors.push(
                "No model configured. Set \"model\" or \"modelFile\" in config.json, \
                 or pass --model-file."
                    .into(),
            ),
            Err(e) => errors.push(format!("modelFile: {}", e)),
        }

        let defaults = &self.agents.defaults;
        if defaults.chat_window == 0 {
            errors.push("agents.defaults.chatWindow must be at least 1.".into());
        }
        if defaults.batch_window == 0 {
            errors.push("agents.defaults.batchWindow must be at least 1.".into());
        }
        if defaults.max_tool_iterations == 0 {
            errors.push("agents.defaults.maxToolIterations must be at least 1.".into());
        }

        if self.tools.timeout_seconds == 0 {
            errors.push("tools.timeoutSeconds must be at least 1.".into());
        }
        if let Some(dir) = self.tools.resolved_dir() {
            if !dir.is_dir() {
                errors.push(format!(
                    "tools.dir '{}' is not a directory. Create it or remove the setting.",
                    dir.display()
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> std::result::Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    if raw.starts_with("~/") || raw.starts_with("~\\") {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(&raw[2..])
    } else {
        PathBuf::from(raw)
    }
}

// ── Model Configuration ─────────────────────────────────────────────

/// Contents of a model file.
///
/// Required string fields default to empty so that a missing key is
/// reported by name when the adapter configuration is built.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelConfig {
    pub model_name: String,
    pub url: String,
    pub api_key_env_var: String,
    pub payload_template: String,
    pub http_headers: BTreeMap<String, String>,
    pub answer_path: String,
    pub input_token_path: String,
    pub output_token_path: String,
    pub finish_reason_path: String,
    pub finish_reason_mappings: BTreeMap<String, FinishReason>,
    pub tool_calls_path: String,
    pub tool_name_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_arguments_dict_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_arguments_string_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

fn required<'a>(field: &'static str, value: &'a str) -> std::result::Result<&'a str, ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Missing(field))
    } else {
        Ok(value)
    }
}

fn required_path(field: &'static str, value: &str) -> std::result::Result<JsonPath, ConfigError> {
    optional_path(field, Some(value).filter(|v| !v.is_empty()))?.ok_or(ConfigError::Missing(field))
}

fn optional_path(
    field: &'static str,
    value: Option<&str>,
) -> std::result::Result<Option<JsonPath>, ConfigError> {
    value
        .map(|v| JsonPath::parse(v).map_err(|source| ConfigError::InvalidPath { field, source }))
        .transpose()
}

impl ModelConfig {
    /// Read a model file.
    pub fn load_from(path: &Path) -> std::result::Result<Self, ConfigError> {
        read_json(path)
    }

    /// Replace the model name, e.g. from the command line.
    pub fn with_model_name(mut self, name: Option<&str>) -> Self {
        if let Some(name) = name {
            self.model_name = name.to_string();
        }
        self
    }

    /// Build the adapter configuration, reading the API key from the
    /// environment variable named by `apiKeyEnvVar`.
    pub fn resolve(&self) -> std::result::Result<AdapterConfig, ConfigError> {
        let var = required("apiKeyEnvVar", &self.api_key_env_var)?;
        let api_key =
            std::env::var(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))?;
        self.to_adapter_config(api_key)
    }

    /// Build the adapter configuration with an explicit API key.
    pub fn to_adapter_config(
        &self,
        api_key: String,
    ) -> std::result::Result<AdapterConfig, ConfigError> {
        let tool_arguments_path = ToolArgumentsPath::from_options(
            optional_path("toolArgumentsDictPath", self.tool_arguments_dict_path.as_deref())?,
            optional_path("toolArgumentsStringPath", self.tool_arguments_string_path.as_deref())?,
        )?;

        let config = AdapterConfig {
            model_name: required("modelName", &self.model_name)?.to_string(),
            api_key,
            base_url: required("url", &self.url)?.to_string(),
            payload_template: required("payloadTemplate", &self.payload_template)?.to_string(),
            http_headers: self
                .http_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            answer_path: required_path("answerPath", &self.answer_path)?,
            input_token_path: required_path("inputTokenPath", &self.input_token_path)?,
            output_token_path: required_path("outputTokenPath", &self.output_token_path)?,
            finish_reason_path: required_path("finishReasonPath", &self.finish_reason_path)?,
            finish_reason_mappings: self.finish_reason_mappings.clone(),
            tool_calls_path: required_path("toolCallsPath", &self.tool_calls_path)?,
            tool_name_path: required_path("toolNamePath", &self.tool_name_path)?,
            tool_call_id_path: optional_path("toolCallIdPath", self.tool_call_id_path.as_deref())?,
            tool_arguments_path,
            connect_timeout: Duration::from_secs(
                self.connect_timeout_seconds
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            timeout: Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        };
        config.validate()?;
        Ok(config)
    }

    /// A working description of the OpenAI chat completions API.
    pub fn openai_example() -> Self {
        Self {
            model_name: "gpt-4.1-nano".into(),
            url: "https://api.openai.com/v1/chat/completions".into(),
            api_key_env_var: "OPENAI_API_KEY".into(),
            payload_template: OPENAI_PAYLOAD_TEMPLATE.into(),
            http_headers: BTreeMap::from([(
                "Authorization".to_string(),
                "Bearer {{apiKey}}".to_string(),
            )]),
            answer_path: "choices[0].message.content".into(),
            input_token_path: "usage.prompt_tokens".into(),
            output_token_path: "usage.completion_tokens".into(),
            finish_reason_path: "choices[0].finish_reason".into(),
            finish_reason_mappings: BTreeMap::from([
                ("stop".to_string(), FinishReason::Done),
                ("length".to_string(), FinishReason::MaxTokens),
                ("tool_calls".to_string(), FinishReason::ToolCall),
            ]),
            tool_calls_path: "choices[0].message.tool_calls".into(),
            tool_name_path: "function.name".into(),
            tool_call_id_path: Some("id".into()),
            tool_arguments_dict_path: None,
            tool_arguments_string_path: Some("function.arguments".into()),
            connect_timeout_seconds: None,
            timeout_seconds: None,
        }
    }
}

const OPENAI_PAYLOAD_TEMPLATE: &str = r#"{
  "model": "{{modelName}}",
  "messages": [
    {{#each messages}}{{#if (isSystem role)}}{ "role": "system", "content": {{convertToJsonString content}} }{{/if}}{{#if (isUser role)}}{ "role": "user", "content": {{convertToJsonString content}} }{{/if}}{{#if (isModel role)}}{ "role": "assistant", "content": {{convertToJsonString content}}{{#if toolCalls}}, "tool_calls": [ {{#each toolCalls}}{ "id": {{convertToJsonString toolCallId}}, "type": "function", "function": { "name": {{convertToJsonString toolName}}, "arguments": {{convertToolParametersToJsonString toolParameters}} } }{{#unless @last}}, {{/unless}}{{/each}} ]{{/if}} }{{/if}}{{#if (isTool role)}}{ "role": "tool", "tool_call_id": {{convertToJsonString toolCallId}}, "content": {{convertToJsonString content}} }{{/if}}{{#unless @last}},
    {{/unless}}{{/each}}
  ]{{#if tools}},
  "tools": [
    {{#each tools}}{
      "type": "function",
      "function": {
        "name": {{convertToJsonString name}},
        "description": {{convertToJsonString description}},
        "parameters": {
          "type": "object",
          "properties": {
            {{#each parameters}}{{convertToJsonString name}}: { "type": "{{type}}", "description": {{convertToJsonString description}} }{{#unless @last}},
            {{/unless}}{{/each}}
          },
          "required": [ {{#each requiredParameters}}{{convertToJsonString name}}{{#unless @last}}, {{/unless}}{{/each}} ]
        }
      }
    }{{#unless @last}},
    {{/unless}}{{/each}}
  ]{{/if}}
}"#;

// ── Agent Configuration ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentDefaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Rounds kept in interactive sessions.
    pub chat_window: usize,
    /// Rounds kept in batch sessions.
    pub batch_window: usize,
    pub max_tool_iterations: u32,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            system_prompt: None,
            chat_window: 25,
            batch_window: 15,
            max_tool_iterations: 20,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub defaults: AgentDefaults,
}

// ── Tools Configuration ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolsConfig {
    /// Directory scanned for tools. No directory means no tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// Program used to run every tool file, e.g. `python3`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    /// Only files with this extension are tools, e.g. `py`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            interpreter: None,
            extension: None,
            timeout_seconds: 30,
        }
    }
}

impl ToolsConfig {
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        self.dir.as_deref().map(expand_home)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}
