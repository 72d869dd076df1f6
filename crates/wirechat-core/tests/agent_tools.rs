#![cfg(unix)]

use std::path::Path;

use serde_json::json;
use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wirechat_core::agent::{AgentConfig, AgentLoop, Conversation};
use wirechat_core::config::{ModelConfig, ToolsConfig};
use wirechat_core::error::{Error, ToolError};
use wirechat_core::provider::custom::CustomProvider;
use wirechat_core::provider::types::Role;
use wirechat_core::tools::ToolManager;

const DATES_TOOL: &str = r#"if [ "$1" = "--description" ]; then
  printf 'Calculate the number of days between start_date and end_date\n'
  printf 'start_date\tstart date formatted as YYYY-MM-DD\n'
  printf 'end_date\tend date formatted as YYYY-MM-DD\n'
  exit 0
fi
days() {
  y=${1%%-*}; rest=${1#*-}
  m=${rest%%-*}; d=${rest#*-}
  m=${m#0}; d=${d#0}
  if [ "$m" -le 2 ]; then y=$((y - 1)); m=$((m + 12)); fi
  echo $((365 * y + y / 4 - y / 100 + y / 400 + (153 * (m - 3) + 2) / 5 + d))
}
echo $(( $(days "$2") - $(days "$1") ))
"#;

fn tools_config(dir: &Path) -> ToolsConfig {
    ToolsConfig {
        dir: Some(dir.display().to_string()),
        interpreter: Some("sh".into()),
        extension: Some("sh".into()),
        timeout_seconds: 10,
    }
}

fn provider(server: &MockServer) -> CustomProvider {
    let mut model = ModelConfig::openai_example();
    model.url = format!("{}/v1/chat/completions", server.uri());
    CustomProvider::new(model.to_adapter_config("test-key".into()).unwrap()).unwrap()
}

fn tool_call_body() -> serde_json::Value {
    json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_dates",
                    "type": "function",
                    "function": {
                        "name": "compute_dates_difference",
                        "arguments": "{\"start_date\":\"2021-01-23\",\"end_date\":\"2027-09-03\"}"
                    }
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": { "prompt_tokens": 90, "completion_tokens": 25 }
    })
}

fn answer_body(text: &str) -> serde_json::Value {
    json!({
        "choices": [{
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 130, "completion_tokens": 2 }
    })
}

#[tokio::test]
async fn test_batch_turn_with_tool_call() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("compute_dates_difference.sh"), DATES_TOOL).unwrap();
    let tools = ToolManager::discover(&tools_config(dir.path())).await.unwrap();
    assert_eq!(tools.len(), 1);

    let server = MockServer::start().await;
    // The follow-up request carries the tool result back to the model.
    Mock::given(method("POST"))
        .and(body_string_contains("\"role\": \"tool\""))
        .and(body_string_contains("\"tool_call_id\": \"call_dates\""))
        .and(body_string_contains("2414"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer_body("2414")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("\"name\": \"compute_dates_difference\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_call_body()))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    let agent = AgentLoop::new(Box::new(provider(&server)), tools, AgentConfig::default());
    let mut conversation = Conversation::with_system_prompt(
        15,
        Some("You must answer in one number, without any other text."),
    );
    let response = agent
        .ask(
            &mut conversation,
            "How many days are there between 2021-01-23 and 2027-09-03?",
        )
        .await
        .unwrap();

    assert_eq!(response.text(), Some("2414"));
    let roles: Vec<Role> = conversation.rounds().iter().map(|r| r.role()).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Model, Role::Tool, Role::Model]
    );
    assert_eq!(conversation.rounds()[3].content(), Some("2414\n"));
}

#[tokio::test]
async fn test_failing_tool_stops_the_turn() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("compute_dates_difference.sh"),
        "if [ \"$1\" = \"--description\" ]; then printf 'Dates\\nstart_date\\tfirst\\nend_date\\tsecond\\n'; exit 0; fi\necho 'bad date' >&2\nexit 1\n",
    )
    .unwrap();
    let tools = ToolManager::discover(&tools_config(dir.path())).await.unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_call_body()))
        .expect(1)
        .mount(&server)
        .await;

    let agent = AgentLoop::new(Box::new(provider(&server)), tools, AgentConfig::default());
    let mut conversation = Conversation::new(15);
    let err = agent.ask(&mut conversation, "days?").await.unwrap_err();

    match err {
        Error::Tool(ToolError::Failed { tool, output, .. }) => {
            assert_eq!(tool, "compute_dates_difference");
            assert_eq!(output, "bad date\n");
        }
        other => panic!("expected a failed tool, got {other:?}"),
    }
    assert!(conversation.is_empty());
}

#[tokio::test]
async fn test_missing_argument_is_tool_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("compute_dates_difference.sh"),
        "if [ \"$1\" = \"--description\" ]; then printf 'Dates\\nstart_date\\tfirst\\nend_date\\tsecond\\nzone\\tthird\\n'; exit 0; fi\necho 0\n",
    )
    .unwrap();
    let tools = ToolManager::discover(&tools_config(dir.path())).await.unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_call_body()))
        .mount(&server)
        .await;

    let agent = AgentLoop::new(Box::new(provider(&server)), tools, AgentConfig::default());
    let mut conversation = Conversation::new(15);
    let err = agent.ask(&mut conversation, "days?").await.unwrap_err();

    match err {
        Error::Tool(ToolError::MissingArgument { tool, parameter }) => {
            assert_eq!(tool, "compute_dates_difference");
            assert_eq!(parameter, "zone");
        }
        other => panic!("expected a missing argument, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_description_fails_discovery() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("weather.sh"),
        "printf 'Weather\\ncity\\tlocation\\trequired\\tthe city\\n'\n",
    )
    .unwrap();

    let err = match ToolManager::discover(&tools_config(dir.path())).await {
        Ok(_) => panic!("discovery should fail"),
        Err(e) => e,
    };
    assert!(matches!(
        err,
        Error::Tool(ToolError::InvalidDescription { ref tool, .. }) if tool == "weather"
    ));
}
