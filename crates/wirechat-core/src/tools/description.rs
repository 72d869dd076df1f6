//! Parsing of the `--description` output of a tool.
//!
//! The first line is the tool description. Every following line declares one
//! parameter, either as `name<TAB>description` (a required string) or as
//! `name<TAB>type<TAB>required|optional<TAB>description`.

use crate::error::ToolError;
use crate::provider::types::{ToolParameter, ToolParameterType, ToolSpecification};

pub fn parse_description(tool: &str, output: &str) -> Result<ToolSpecification, ToolError> {
    let invalid = |reason: String| ToolError::InvalidDescription {
        tool: tool.to_string(),
        reason,
    };

    let mut lines = output.trim_end().lines();
    let description = lines
        .next()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| invalid("the description is empty".into()))?;

    let mut parameters: Vec<ToolParameter> = Vec::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        let parts: Vec<&str> = line.split('\t').map(str::trim).collect();
        let parameter = match parts.as_slice() {
            [name, description] => ToolParameter {
                name: name.to_string(),
                description: description.to_string(),
                kind: ToolParameterType::String,
                required: true,
            },
            [name, kind, optionality, description] => ToolParameter {
                name: name.to_string(),
                description: description.to_string(),
                kind: kind.parse().map_err(invalid)?,
                required: parse_optionality(optionality).map_err(invalid)?,
            },
            _ => {
                return Err(invalid(format!(
                    "a parameter line must have 2 or 4 tab-separated fields, found {}: '{}'",
                    parts.len(),
                    line
                )))
            }
        };

        if parameter.name.is_empty() || parameter.name.contains(char::is_whitespace) {
            return Err(invalid(format!("invalid parameter name '{}'", parameter.name)));
        }
        if parameters.iter().any(|p| p.name == parameter.name) {
            return Err(invalid(format!("parameter '{}' is declared twice", parameter.name)));
        }
        parameters.push(parameter);
    }

    Ok(ToolSpecification {
        name: tool.to_string(),
        description: description.to_string(),
        parameters,
    })
}

fn parse_optionality(s: &str) -> Result<bool, String> {
    match s {
        "required" => Ok(true),
        "optional" => Ok(false),
        other => Err(format!("'{}' is not a supported tool argument optionality", other)),
    }
}
