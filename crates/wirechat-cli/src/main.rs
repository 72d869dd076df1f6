//! wirechat CLI: batch and interactive chat against a configured model.
//!
//! Usage:
//!   wirechat run --user-prompt "..."   - Send one prompt and print the answer
//!   wirechat chat                      - Start an interactive chat session
//!   wirechat tools                     - List discovered tools
//!   wirechat onboard                   - Create a default configuration
//!   wirechat status                    - Show current configuration and health

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::debug;

use wirechat_core::agent::{AgentConfig, AgentLoop, Conversation};
use wirechat_core::config::{Config, ModelConfig};
use wirechat_core::error::{ConfigError, Error};
use wirechat_core::provider::custom::CustomProvider;
use wirechat_core::provider::LlmProvider;
use wirechat_core::tools::ToolManager;

// ── Exit codes ──────────────────────────────────────────────────────

const SUCCESS: u8 = 0;
const INVALID_COMMAND_LINE: u8 = 1;
const FILE_ERROR: u8 = 2;
const INVALID_PROVIDER: u8 = 3;
const MODEL_ERROR: u8 = 4;
const TOOL_ERROR: u8 = 6;

#[derive(Parser)]
#[command(
    name = "wirechat",
    version,
    about = "Chat with any JSON-over-HTTP language model",
    long_about = "wirechat talks to an arbitrary HTTP language model backend.\n\nThe request body, headers and the location of every response field come from a model file, so no vendor needs dedicated code."
)]
struct Cli {
    /// Log filter, e.g. "debug" or "wirechat_core=trace" (RUST_LOG wins when set)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a single prompt and print the answer
    Run {
        #[command(flatten)]
        session: SessionArgs,

        /// User prompt (read from stdin when neither this nor --user-prompt-file is given)
        #[arg(short, long, conflicts_with = "user_prompt_file")]
        user_prompt: Option<String>,

        /// File holding the user prompt
        #[arg(long)]
        user_prompt_file: Option<PathBuf>,

        /// Write the answer to this file instead of stdout
        #[arg(short, long)]
        output_file: Option<PathBuf>,
    },

    /// Start an interactive chat session
    Chat {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// List the tools found in the tools directory
    Tools {
        /// Tools directory (overrides config)
        #[arg(short, long)]
        tools_dir: Option<String>,
    },

    /// Create or reset the default configuration
    Onboard,

    /// Show configuration status and health
    Status,
}

#[derive(Args)]
struct SessionArgs {
    /// Model file (overrides config)
    #[arg(short = 'f', long)]
    model_file: Option<PathBuf>,

    /// Model name sent to the backend (overrides the model file)
    #[arg(short = 'm', long)]
    model_name: Option<String>,

    /// Tools directory (overrides config)
    #[arg(short, long)]
    tools_dir: Option<String>,

    /// System prompt (overrides config)
    #[arg(short, long, conflicts_with = "system_prompt_file")]
    system_prompt: Option<String>,

    /// File holding the system prompt
    #[arg(long)]
    system_prompt_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                INVALID_COMMAND_LINE
            } else {
                SUCCESS
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    // Logs go to stderr so that stdout carries only answers.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();

    let result = match cli.command {
        Some(Commands::Run {
            session,
            user_prompt,
            user_prompt_file,
            output_file,
        }) => {
            cmd_run(
                &session,
                user_prompt,
                user_prompt_file.as_deref(),
                output_file.as_deref(),
            )
            .await
        }
        Some(Commands::Chat { session }) => cmd_chat(&session).await,
        Some(Commands::Tools { tools_dir }) => cmd_tools(tools_dir).await,
        Some(Commands::Onboard) => cmd_onboard(),
        Some(Commands::Status) => cmd_status(),
        None => cmd_status(),
    };

    match result {
        Ok(()) => ExitCode::from(SUCCESS),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Map a failure to the process exit code.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<Error>() {
        return match e {
            Error::Config(ConfigError::Read { .. } | ConfigError::Write { .. }) => FILE_ERROR,
            Error::Config(ConfigError::UnmappedFinishReason(_)) => MODEL_ERROR,
            Error::Config(_) | Error::Template { .. } => INVALID_PROVIDER,
            Error::Tool(_) => TOOL_ERROR,
            Error::Extraction(_) | Error::Transport { .. } => MODEL_ERROR,
        };
    }
    if let Some(e) = err.downcast_ref::<ConfigError>() {
        return match e {
            ConfigError::Read { .. } | ConfigError::Write { .. } => FILE_ERROR,
            _ => INVALID_PROVIDER,
        };
    }
    if err.downcast_ref::<io::Error>().is_some() {
        return FILE_ERROR;
    }
    MODEL_ERROR
}

// ── Session setup ───────────────────────────────────────────────────

struct Session {
    agent: AgentLoop,
    system_prompt: Option<String>,
    config: Config,
}

async fn open_session(args: &SessionArgs) -> Result<Session> {
    let mut config = Config::load()?;
    if let Some(dir) = &args.tools_dir {
        config.tools.dir = Some(dir.clone());
    }

    let model = match &args.model_file {
        Some(path) => ModelConfig::load_from(path).map_err(Error::from)?,
        None => config.model_config()?.ok_or_else(|| {
            Error::from(ConfigError::Missing("modelFile"))
        })?,
    };
    let adapter = model
        .with_model_name(args.model_name.as_deref())
        .resolve()
        .map_err(Error::from)?;
    let provider = CustomProvider::new(adapter)?;

    let tools = ToolManager::discover(&config.tools).await?;

    let system_prompt = match (&args.system_prompt, &args.system_prompt_file) {
        (Some(prompt), _) => Some(prompt.clone()),
        (None, Some(path)) => Some(read_file(path)?),
        (None, None) => config.agents.defaults.system_prompt.clone(),
    };

    let agent_config = AgentConfig {
        max_iterations: config.agents.defaults.max_tool_iterations,
    };
    debug!(
        model = provider.model_name(),
        tools = tools.len(),
        "Session ready"
    );

    Ok(Session {
        agent: AgentLoop::new(Box::new(provider), tools, agent_config),
        system_prompt,
        config,
    })
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read '{}'", path.display()))
}

// ── Run Command ─────────────────────────────────────────────────────

async fn cmd_run(
    args: &SessionArgs,
    user_prompt: Option<String>,
    user_prompt_file: Option<&Path>,
    output_file: Option<&Path>,
) -> Result<()> {
    let prompt = match (user_prompt, user_prompt_file) {
        (Some(prompt), _) => prompt,
        (None, Some(path)) => read_file(path)?,
        (None, None) => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("failed to read the prompt from stdin")?;
            buf
        }
    };

    let session = open_session(args).await?;
    let mut conversation = Conversation::with_system_prompt(
        session.config.agents.defaults.batch_window,
        session.system_prompt.as_deref(),
    );

    let response = session.agent.ask(&mut conversation, prompt.trim()).await?;
    let answer = response.text().unwrap_or_default();

    match output_file {
        Some(path) => std::fs::write(path, answer)
            .with_context(|| format!("failed to write '{}'", path.display()))?,
        None => println!("{}", answer),
    }
    Ok(())
}

// ── Chat Command ────────────────────────────────────────────────────

async fn cmd_chat(args: &SessionArgs) -> Result<()> {
    let session = open_session(args).await?;
    let mut conversation = Conversation::with_system_prompt(
        session.config.agents.defaults.chat_window,
        session.system_prompt.as_deref(),
    );

    println!();
    println!("  wirechat v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Model: {} | {} tools loaded",
        session.agent.provider().model_name(),
        session.agent.tools().len()
    );
    println!();
    println!("  Type your message, /clear to forget the history, or /quit to exit.");
    println!("  ─────────────────────────────────────");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  > ");
        io::stdout().flush()?;

        let Some(input) = lines.next_line().await? else {
            break;
        };
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" | "/q" => break,
            "/clear" => {
                conversation.clear();
                println!("  History cleared.");
                continue;
            }
            _ => {}
        }

        match session.agent.ask(&mut conversation, input).await {
            Ok(response) => println!("\n  {}\n", response.text().unwrap_or_default()),
            Err(e) => eprintln!("\n  Error: {}\n", e),
        }
    }

    Ok(())
}

// ── Tools Command ───────────────────────────────────────────────────

async fn cmd_tools(tools_dir: Option<String>) -> Result<()> {
    let mut config = Config::load()?;
    if tools_dir.is_some() {
        config.tools.dir = tools_dir;
    }

    let tools = ToolManager::discover(&config.tools).await?;
    if tools.is_empty() {
        println!("  No tools found.");
        return Ok(());
    }

    println!();
    for spec in tools.specifications() {
        println!("  {} - {}", spec.name, spec.description);
        for param in &spec.parameters {
            println!(
                "     {} ({}{}): {}",
                param.name,
                param.kind,
                if param.required { "" } else { ", optional" },
                param.description
            );
        }
    }
    println!();
    Ok(())
}

// ── Onboard Command ─────────────────────────────────────────────────

fn cmd_onboard() -> Result<()> {
    let path = Config::write_default_template()?;
    println!();
    println!("  Configuration created at:");
    println!("     {}", path.display());
    println!();
    println!("  Next steps:");
    println!("  1. Export the API key variable named by apiKeyEnvVar (OPENAI_API_KEY)");
    println!("  2. Put tools in ~/.wirechat/tools");
    println!("  3. Run `wirechat chat` to start chatting");
    println!();
    Ok(())
}

// ── Status Command ──────────────────────────────────────────────────

fn cmd_status() -> Result<()> {
    let config_path = Config::default_path();
    let config = Config::load()?;

    println!();
    println!("  wirechat status");
    println!("  ─────────────────────────────────────");

    if config_path.exists() {
        println!("  Config:    {}", config_path.display());
    } else {
        println!("  Config:    not found (run `wirechat onboard`)");
    }

    match config.model_config() {
        Ok(Some(model)) => println!("  Model:     {} at {}", model.model_name, model.url),
        Ok(None) => println!("  Model:     not configured"),
        Err(e) => println!("  Model:     {}", e),
    }

    match config.tools.resolved_dir() {
        Some(dir) => println!("  Tools:     {}", dir.display()),
        None => println!("  Tools:     none"),
    }

    match config.validate() {
        Ok(()) => println!("  Health:    ok"),
        Err(errors) => {
            println!("  Health:    {} problem(s)", errors.len());
            for e in errors {
                println!("     - {}", e);
            }
        }
    }

    println!();
    Ok(())
}
