//! Tool manager: discovery, argument extraction and execution of local tools.
//!
//! A tool is an executable file in the configured directory. Its signature
//! comes from running it with `--description`; calls run it with one
//! positional argument per declared parameter.

pub mod description;
pub mod process;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::config::ToolsConfig;
use crate::error::{Result, ToolError};
use crate::provider::types::{
    MessageRound, ToolCall, ToolParameterType, ToolParameterValue, ToolSpecification,
};
use description::parse_description;
use process::Launcher;

/// Discovered tools plus everything needed to run them.
#[derive(Debug)]
pub struct ToolManager {
    specs: Vec<ToolSpecification>,
    launchers: HashMap<String, Launcher>,
    timeout: Duration,
}

impl ToolManager {
    /// A manager with no tools. The model is then never offered tool calling.
    pub fn empty() -> Self {
        Self {
            specs: Vec::new(),
            launchers: HashMap::new(),
            timeout: ToolsConfig::default().timeout(),
        }
    }

    /// Scan the tools directory and query every candidate with `--description`.
    ///
    /// Any malformed description aborts discovery.
    pub async fn discover(config: &ToolsConfig) -> Result<Self> {
        let Some(dir) = config.resolved_dir() else {
            debug!("No tools directory configured");
            return Ok(Self::empty());
        };
        if !dir.is_dir() {
            return Err(ToolError::DirectoryNotFound(dir).into());
        }

        let entries =
            std::fs::read_dir(&dir).map_err(|_| ToolError::DirectoryNotFound(dir.clone()))?;

        let mut found: Vec<(String, Launcher)> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_candidate(&path, config) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!(path = %path.display(), "Skipping tool with a non UTF-8 name");
                continue;
            };
            if let Some((_, other)) = found.iter().find(|(n, _)| n == name) {
                return Err(ToolError::InvalidDescription {
                    tool: name.to_string(),
                    reason: format!(
                        "both '{}' and '{}' provide this tool",
                        other.program.display(),
                        path.display()
                    ),
                }
                .into());
            }
            found.push((name.to_string(), Launcher::new(path, config.interpreter.clone())));
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));

        let timeout = config.timeout();
        let mut specs = Vec::with_capacity(found.len());
        let mut launchers = HashMap::with_capacity(found.len());
        for (name, launcher) in found {
            let output = launcher
                .run(&name, &["--description".to_string()], timeout)
                .await?;
            let spec = parse_description(&name, &output)?;
            debug!(
                tool = %spec.name,
                params = spec.parameters.len(),
                "Registered tool"
            );
            specs.push(spec);
            launchers.insert(name, launcher);
        }

        info!(count = specs.len(), dir = %dir.display(), "Discovered tools");
        Ok(Self {
            specs,
            launchers,
            timeout,
        })
    }

    /// Tool signatures offered to the model, sorted by name.
    pub fn specifications(&self) -> &[ToolSpecification] {
        &self.specs
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpecification> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Run one tool and wrap its output in a TOOL round.
    pub async fn execute(
        &self,
        tool_name: &str,
        call_id: Option<&str>,
        arguments_json: &str,
    ) -> Result<MessageRound> {
        let (Some(spec), Some(launcher)) = (self.get(tool_name), self.launchers.get(tool_name))
        else {
            error!(tool = tool_name, "Model requested an unknown tool");
            return Err(ToolError::UnknownTool(tool_name.to_string()).into());
        };

        let args = extract_arguments(spec, arguments_json)?;
        info!(tool = tool_name, call_id, "Executing tool");

        let output = launcher.run(tool_name, &args, self.timeout).await.map_err(|e| {
            error!(tool = tool_name, error = %e, "Tool execution failed");
            e
        })?;
        debug!(tool = tool_name, bytes = output.len(), "Tool finished");

        Ok(MessageRound::tool_result(
            tool_name,
            call_id.map(str::to_string),
            output,
        ))
    }

    pub async fn execute_call(&self, call: &ToolCall) -> Result<MessageRound> {
        self.execute(&call.tool_name, call.call_id.as_deref(), &call.arguments)
            .await
    }

    /// Execute calls one after another, in the order given.
    pub async fn execute_all(&self, calls: &[ToolCall]) -> Result<Vec<MessageRound>> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute_call(call).await?);
        }
        Ok(results)
    }
}

fn is_candidate(path: &Path, config: &ToolsConfig) -> bool {
    if !path.is_file() {
        return false;
    }
    if let Some(ext) = config.extension.as_deref() {
        let wanted = ext.trim_start_matches('.');
        if path.extension().and_then(|e| e.to_str()) != Some(wanted) {
            return false;
        }
    }
    config.interpreter.is_some() || is_executable(path)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

// ── Argument extraction ─────────────────────────────────────────────

/// Turn the model's JSON arguments into positional strings, one per declared
/// parameter in declared order.
pub fn extract_arguments(
    spec: &ToolSpecification,
    arguments_json: &str,
) -> std::result::Result<Vec<String>, ToolError> {
    let invalid = |reason: String| ToolError::InvalidArguments {
        tool: spec.name.clone(),
        reason,
    };

    let arguments: Map<String, Value> = if arguments_json.trim().is_empty() {
        Map::new()
    } else {
        match serde_json::from_str::<Value>(arguments_json) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(invalid(format!(
                    "expected a JSON object, got {}",
                    crate::provider::json_path::kind_of(&other)
                )))
            }
            Err(e) => return Err(invalid(e.to_string())),
        }
    };

    spec.parameters
        .iter()
        .map(|param| {
            let value = arguments.get(&param.name).filter(|v| !v.is_null());
            let Some(value) = value else {
                return if param.required {
                    Err(ToolError::MissingArgument {
                        tool: spec.name.clone(),
                        parameter: param.name.clone(),
                    })
                } else {
                    Ok(String::new())
                };
            };

            let converted = match param.kind {
                ToolParameterType::String => ToolParameterValue::infer(value)
                    .map(|v| ToolParameterValue::String(v.to_argument())),
                kind => ToolParameterValue::from_json(kind, value),
            };
            converted
                .map(|v| v.to_argument())
                .map_err(|e| ToolError::InvalidArgument {
                    tool: spec.name.clone(),
                    parameter: param.name.clone(),
                    reason: e.to_string(),
                })
        })
        .collect()
}
