//! Request rendering through Handlebars templates.
//!
//! The request body and every header value are templates evaluated against a
//! [`TemplateContext`]. HTML escaping is disabled; templates produce JSON (or
//! plain header text) and use the registered helpers to emit literals:
//!
//! | Helper                                   | Renders                                   |
//! |------------------------------------------|-------------------------------------------|
//! | `isSystem` `isUser` `isModel` `isTool`   | role tests, for `{{#if (isUser role)}}`   |
//! | `isStringType` … `isBooleanType`         | parameter type tests                      |
//! | `convertStringToJsonString`              | a quoted JSON string, or `null`           |
//! | `convertToJsonString`                    | alias of the above                        |
//! | `convertToolParameterValueToJsonString`  | a typed argument as a JSON literal        |
//! | `convertToolParametersToJsonString`      | all arguments as an escaped JSON object   |

use handlebars::{
    handlebars_helper, no_escape, Context, Handlebars, Helper, HelperResult, Output,
    RenderContext, RenderError, RenderErrorReason,
};
use serde::Serialize;
use serde_json::Value;

use super::types::{MessageRound, Role, ToolParameter, ToolParameterValue, ToolSpecification};
use crate::error::{Error, Result};

// ── Context ─────────────────────────────────────────────────────────

/// Data visible to templates. Keys are camelCase.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateContext<'a> {
    messages: Vec<MessageView<'a>>,
    model_name: &'a str,
    api_key: &'a str,
    tools: Vec<ToolView<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageView<'a> {
    role: Role,
    content: Option<&'a str>,
    tool_calls: Vec<ToolCallView<'a>>,
    tool_name: Option<&'a str>,
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallView<'a> {
    tool_name: &'a str,
    tool_call_id: Option<&'a str>,
    tool_parameters: Vec<ParameterView<'a>>,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ParameterView<'a> {
    parameter_name: &'a str,
    parameter_value: &'a ToolParameterValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolView<'a> {
    name: &'a str,
    description: &'a str,
    parameters: Vec<&'a ToolParameter>,
    required_parameters: Vec<&'a ToolParameter>,
}

impl<'a> TemplateContext<'a> {
    pub fn new(
        messages: &'a [MessageRound],
        model_name: &'a str,
        tools: &'a [ToolSpecification],
        api_key: &'a str,
    ) -> Self {
        let messages = messages
            .iter()
            .map(|round| MessageView {
                role: round.role(),
                content: round.content(),
                tool_calls: round
                    .tool_calls()
                    .iter()
                    .map(|call| ToolCallView {
                        tool_name: &call.tool_name,
                        tool_call_id: call.call_id.as_deref(),
                        tool_parameters: call
                            .parameters
                            .iter()
                            .map(|(name, value)| ParameterView {
                                parameter_name: name,
                                parameter_value: value,
                            })
                            .collect(),
                        arguments: &call.arguments,
                    })
                    .collect(),
                tool_name: round.tool_name(),
                tool_call_id: round.tool_call_id(),
            })
            .collect();

        let tools = tools
            .iter()
            .map(|spec| ToolView {
                name: &spec.name,
                description: &spec.description,
                parameters: spec.parameters.iter().collect(),
                required_parameters: spec.required_parameters().collect(),
            })
            .collect();

        Self {
            messages,
            model_name,
            api_key,
            tools,
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

handlebars_helper!(is_system: |role: str| role == Role::System.as_str());
handlebars_helper!(is_user: |role: str| role == Role::User.as_str());
handlebars_helper!(is_model: |role: str| role == Role::Model.as_str());
handlebars_helper!(is_tool: |role: str| role == Role::Tool.as_str());

handlebars_helper!(is_string_type: |kind: str| kind == "string");
handlebars_helper!(is_integer_type: |kind: str| kind == "integer");
handlebars_helper!(is_number_type: |kind: str| kind == "number");
handlebars_helper!(is_boolean_type: |kind: str| kind == "boolean");

fn first_param<'a>(h: &'a Helper) -> std::result::Result<&'a Value, RenderError> {
    h.param(0).map(|p| p.value()).ok_or_else(|| {
        RenderErrorReason::Other(format!("helper '{}' expects one argument", h.name())).into()
    })
}

/// Quote and escape text as a JSON string literal.
pub fn json_string_literal(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

fn convert_string(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let rendered = match first_param(h)? {
        Value::Null => "null".to_string(),
        Value::String(s) => json_string_literal(s),
        other => json_string_literal(&other.to_string()),
    };
    out.write(&rendered)?;
    Ok(())
}

fn parameter_value(h: &Helper, value: &Value) -> std::result::Result<ToolParameterValue, RenderError> {
    serde_json::from_value(value.clone()).map_err(|e| {
        RenderErrorReason::Other(format!(
            "helper '{}' expects a tool parameter value: {}",
            h.name(),
            e
        ))
        .into()
    })
}

fn convert_parameter_value(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = parameter_value(h, first_param(h)?)?;
    out.write(&value.to_json_literal())?;
    Ok(())
}

fn convert_parameters(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let list = first_param(h)?.as_array().ok_or_else(|| {
        RenderError::from(RenderErrorReason::Other(format!(
            "helper '{}' expects a list of tool parameters",
            h.name()
        )))
    })?;

    let mut fields = Vec::with_capacity(list.len());
    for entry in list {
        let name = entry
            .get("parameterName")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RenderError::from(RenderErrorReason::Other(format!(
                    "helper '{}' found a parameter without a name",
                    h.name()
                )))
            })?;
        let value = parameter_value(h, entry.get("parameterValue").unwrap_or(&Value::Null))?;
        fields.push(format!("{}: {}", json_string_literal(name), value.to_json_literal()));
    }

    let object = if fields.is_empty() {
        "{}".to_string()
    } else {
        format!("{{ {} }}", fields.join(", "))
    };
    out.write(&json_string_literal(&object))?;
    Ok(())
}

fn new_registry() -> Handlebars<'static> {
    let mut hb = Handlebars::new();
    hb.register_escape_fn(no_escape);

    hb.register_helper("isSystem", Box::new(is_system));
    hb.register_helper("isUser", Box::new(is_user));
    hb.register_helper("isModel", Box::new(is_model));
    hb.register_helper("isTool", Box::new(is_tool));

    hb.register_helper("isStringType", Box::new(is_string_type));
    hb.register_helper("isIntegerType", Box::new(is_integer_type));
    hb.register_helper("isNumberType", Box::new(is_number_type));
    hb.register_helper("isBooleanType", Box::new(is_boolean_type));

    hb.register_helper("convertStringToJsonString", Box::new(convert_string));
    hb.register_helper("convertToJsonString", Box::new(convert_string));
    hb.register_helper(
        "convertToolParameterValueToJsonString",
        Box::new(convert_parameter_value),
    );
    hb.register_helper(
        "convertToolParametersToJsonString",
        Box::new(convert_parameters),
    );
    hb
}

/// Prefix every line with a three-digit line number, for error reports.
pub fn number_lines(template: &str) -> String {
    template
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:03} {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn template_error(message: impl ToString, source: &str) -> Error {
    Error::Template {
        message: message.to_string(),
        template: number_lines(source),
    }
}

// ── Generator ───────────────────────────────────────────────────────

const BODY: &str = "body";

/// Compiled body and header templates of one adapter.
pub struct PayloadGenerator {
    registry: Handlebars<'static>,
    body_source: String,
    /// Header name, registry key, template source.
    headers: Vec<(String, String, String)>,
}

impl std::fmt::Debug for PayloadGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadGenerator")
            .field("headers", &self.headers.iter().map(|(n, _, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

impl PayloadGenerator {
    /// Compile the body template and every header template.
    pub fn new(body: &str, headers: &[(String, String)]) -> Result<Self> {
        let mut registry = new_registry();
        registry
            .register_template_string(BODY, body)
            .map_err(|e| template_error(e, body))?;

        let mut compiled = Vec::with_capacity(headers.len());
        for (i, (name, source)) in headers.iter().enumerate() {
            let key = format!("header-{}", i);
            registry
                .register_template_string(&key, source)
                .map_err(|e| template_error(e, source))?;
            compiled.push((name.clone(), key, source.clone()));
        }

        Ok(Self {
            registry,
            body_source: body.to_string(),
            headers: compiled,
        })
    }

    pub fn render_body(&self, context: &TemplateContext<'_>) -> Result<String> {
        self.registry
            .render(BODY, context)
            .map_err(|e| template_error(e, &self.body_source))
    }

    /// Render every header value, in configuration order.
    pub fn render_headers(&self, context: &TemplateContext<'_>) -> Result<Vec<(String, String)>> {
        self.headers
            .iter()
            .map(|(name, key, source)| {
                self.registry
                    .render(key, context)
                    .map(|value| (name.clone(), value))
                    .map_err(|e| template_error(e, source))
            })
            .collect()
    }
}

/// Compile and render a single template in one step.
pub fn render(template: &str, context: &TemplateContext<'_>) -> Result<String> {
    PayloadGenerator::new(template, &[])?.render_body(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::{ToolCall, ToolParameterType};
    use serde_json::json;

    const OPENAI_TEMPLATE: &str = r#"{
  "model": "{{modelName}}",
  "messages": [
    {{#each messages}}{
      "role": "{{#if (isSystem role)}}system{{/if}}{{#if (isUser role)}}user{{/if}}{{#if (isModel role)}}assistant{{/if}}",
      "content": {{convertToJsonString content}}
    }{{#unless @last}},
    {{/unless}}{{/each}}
  ],
  "temperature": 0.7,
  "seed": 42
}"#;

    fn conversation() -> Vec<MessageRound> {
        vec![
            MessageRound::system("You are a helpful assistant"),
            MessageRound::user("What is the weather?"),
            MessageRound::model(Some("I don't have access to weather data".into()), vec![]).unwrap(),
            MessageRound::user("What day is it?"),
            MessageRound::model(Some("April fools' day".into()), vec![]).unwrap(),
            MessageRound::user("So, tell me a joke!"),
        ]
    }

    fn render_one(template: &str, messages: &[MessageRound], tools: &[ToolSpecification]) -> String {
        let ctx = TemplateContext::new(messages, "my-model-name", tools, "my-secret-API-key");
        render(template, &ctx).unwrap()
    }

    #[test]
    fn test_openai_body_with_history() {
        let rendered = render_one(OPENAI_TEMPLATE, &conversation(), &[]);
        let body: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "my-model-name",
                "messages": [
                    {"role": "system", "content": "You are a helpful assistant"},
                    {"role": "user", "content": "What is the weather?"},
                    {"role": "assistant", "content": "I don't have access to weather data"},
                    {"role": "user", "content": "What day is it?"},
                    {"role": "assistant", "content": "April fools' day"},
                    {"role": "user", "content": "So, tell me a joke!"}
                ],
                "temperature": 0.7,
                "seed": 42
            })
        );
    }

    #[test]
    fn test_gemini_tool_declarations() {
        let template = r#"{
  "contents": [{{#each messages}}{{#if (isUser role)}}{"role": "user", "parts": [{"text": {{convertToJsonString content}} }]}{{/if}}{{/each}}],
  "tools": [{"function_declarations": [
    {{#each tools}}{
      "name": {{convertToJsonString name}},
      "description": {{convertToJsonString description}},
      "parameters": {
        "type": "object",
        "properties": {
          {{#each parameters}}{{convertToJsonString name}}: {
            "type": {{#if (isStringType type)}}"string"{{/if}}{{#if (isIntegerType type)}}"integer"{{/if}}{{#if (isNumberType type)}}"number"{{/if}}{{#if (isBooleanType type)}}"boolean"{{/if}},
            "description": {{convertToJsonString description}}
          }{{#unless @last}},{{/unless}}{{/each}}
        },
        "required": [{{#each requiredParameters}}{{convertToJsonString name}}{{#unless @last}},{{/unless}}{{/each}}]
      }
    }{{#unless @last}},{{/unless}}{{/each}}
  ]}]
}"#;
        let param = |name: &str, desc: &str, kind, required| ToolParameter {
            name: name.into(),
            description: desc.into(),
            kind,
            required,
        };
        let tools = vec![
            ToolSpecification {
                name: "getWeather".into(),
                description: "Get the weather".into(),
                parameters: vec![param("city", "The city", ToolParameterType::String, true)],
            },
            ToolSpecification {
                name: "foo".into(),
                description: "Perform foo".into(),
                parameters: vec![
                    param("alpha", "first", ToolParameterType::String, true),
                    param("beta", "second", ToolParameterType::Integer, true),
                    param("gamma", "third", ToolParameterType::Number, false),
                    param("delta", "fourth", ToolParameterType::Boolean, true),
                ],
            },
        ];
        let messages = vec![MessageRound::user("What is the weather?")];

        let body: Value = serde_json::from_str(&render_one(template, &messages, &tools)).unwrap();
        let decls = &body["tools"][0]["function_declarations"];
        assert_eq!(decls[0]["name"], "getWeather");
        assert_eq!(decls[0]["parameters"]["required"], json!(["city"]));
        assert_eq!(decls[1]["parameters"]["properties"]["gamma"]["type"], "number");
        assert_eq!(decls[1]["parameters"]["properties"]["delta"]["type"], "boolean");
        assert_eq!(decls[1]["parameters"]["required"], json!(["alpha", "beta", "delta"]));
        assert_eq!(body["contents"][0]["parts"][0]["text"], "What is the weather?");
    }

    #[test]
    fn test_api_key_is_not_escaped() {
        let messages = conversation();
        let ctx = TemplateContext::new(&messages, "m", &[], "&é~\"#'{([-|è`_\\ç^à@)]");
        assert_eq!(
            render("Bearer: {{apiKey}}", &ctx).unwrap(),
            "Bearer: &é~\"#'{([-|è`_\\ç^à@)]"
        );
    }

    #[test]
    fn test_static_and_empty_templates() {
        let messages = vec![MessageRound::user("Hello")];
        assert_eq!(
            render_one("This is a static template without placeholders", &messages, &[]),
            "This is a static template without placeholders"
        );
        assert_eq!(render_one("", &messages, &[]), "");
        assert_eq!(
            render_one("Messages: {{#each messages}}{{convertToJsonString content}}{{/each}}", &[], &[]),
            "Messages: "
        );
    }

    #[test]
    fn test_string_escaping() {
        let messages = vec![MessageRound::user("Hello \"world\" with 'quotes' and \n newlines\tà\u{1}")];
        assert_eq!(
            render_one("{{#each messages}}{{convertStringToJsonString content}}{{/each}}", &messages, &[]),
            "\"Hello \\\"world\\\" with 'quotes' and \\n newlines\\tà\\u0001\""
        );
    }

    #[test]
    fn test_string_conversion_parses_back() {
        let mut input: String = (0u8..=0x1f).map(char::from).collect();
        input.push_str("\"\\ / Grüße, 日本語 😀 \u{7f}\u{2028}");

        let messages = vec![MessageRound::user(input.clone())];
        let rendered = render_one(
            "{{#each messages}}{{convertStringToJsonString content}}{{/each}}",
            &messages,
            &[],
        );
        assert_eq!(serde_json::from_str::<String>(&rendered).unwrap(), input);
        assert_eq!(
            serde_json::from_str::<String>(&json_string_literal(&input)).unwrap(),
            input
        );
    }

    #[test]
    fn test_null_content_renders_null() {
        let call = ToolCall::from_arguments("get_weather", Some("c1".into()), &Default::default()).unwrap();
        let messages = vec![MessageRound::model(None, vec![call]).unwrap()];
        assert_eq!(
            render_one("{{#each messages}}{{convertToJsonString content}}{{/each}}", &messages, &[]),
            "null"
        );
    }

    #[test]
    fn test_tool_call_rendering() {
        let args = json!({"city": "Paris", "days": 3, "metric": true});
        let call = ToolCall::from_arguments("get_weather", Some("call_9".into()), args.as_object().unwrap()).unwrap();
        let messages = vec![
            MessageRound::model(None, vec![call]).unwrap(),
            MessageRound::tool_result("get_weather", Some("call_9".into()), "sunny"),
        ];

        let template = r#"[{{#each messages}}{{#if (isModel role)}}{{#each toolCalls}}{"id": {{convertToJsonString toolCallId}}, "args": {{convertToolParametersToJsonString toolParameters}}, "first": {{#each toolParameters}}{{#if @first}}{{convertToolParameterValueToJsonString parameterValue}}{{/if}}{{/each}} }{{/each}}{{/if}}{{#if (isTool role)}}, {"tool": {{convertToJsonString toolName}}, "id": {{convertToJsonString toolCallId}}, "out": {{convertToJsonString content}} }{{/if}}{{/each}}]"#;

        let parsed: Value = serde_json::from_str(&render_one(template, &messages, &[])).unwrap();
        assert_eq!(parsed[0]["id"], "call_9");
        assert_eq!(parsed[0]["first"], "Paris");
        let args_text = parsed[0]["args"].as_str().unwrap();
        let args: Value = serde_json::from_str(args_text).unwrap();
        assert_eq!(args, json!({"city": "Paris", "days": 3, "metric": true}));
        assert_eq!(parsed[1], json!({"tool": "get_weather", "id": "call_9", "out": "sunny"}));
    }

    #[test]
    fn test_raw_arguments_exposed() {
        let args = json!({"b": 1, "a": "x"});
        let call = ToolCall::from_arguments("t", None, args.as_object().unwrap()).unwrap();
        let messages = vec![MessageRound::model(None, vec![call]).unwrap()];
        assert_eq!(
            render_one("{{#each messages}}{{#each toolCalls}}{{arguments}}{{/each}}{{/each}}", &messages, &[]),
            r#"{"b":1,"a":"x"}"#
        );
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let messages = conversation();
        let first = render_one(OPENAI_TEMPLATE, &messages, &[]);
        let second = render_one(OPENAI_TEMPLATE, &messages, &[]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_syntax_error_reports_numbered_template() {
        let err = PayloadGenerator::new("first line\nHello {{#each messages}}{{role}", &[]).unwrap_err();
        match err {
            Error::Template { template, .. } => {
                assert_eq!(template, "001 first line\n002 Hello {{#each messages}}{{role}");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_render_error_is_template_error() {
        let messages = vec![MessageRound::user("Hello")];
        let ctx = TemplateContext::new(&messages, "m", &[], "k");
        let err = render("{{convertStringToJsonString}}", &ctx).unwrap_err();
        assert!(matches!(err, Error::Template { .. }));
        assert!(err.to_string().contains("001 {{convertStringToJsonString}}"));
    }

    #[test]
    fn test_headers_render_in_order() {
        let headers = vec![
            ("Authorization".to_string(), "Bearer {{apiKey}}".to_string()),
            ("X-Model".to_string(), "{{modelName}}".to_string()),
        ];
        let generator = PayloadGenerator::new("{}", &headers).unwrap();
        let messages = vec![MessageRound::user("Hello")];
        let ctx = TemplateContext::new(&messages, "gpt-x", &[], "sk-1");
        assert_eq!(
            generator.render_headers(&ctx).unwrap(),
            vec![
                ("Authorization".to_string(), "Bearer sk-1".to_string()),
                ("X-Model".to_string(), "gpt-x".to_string()),
            ]
        );
    }
}
