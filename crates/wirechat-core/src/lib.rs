//! wirechat-core: Core library for the wirechat client.
//!
//! This crate lets one chat client talk to any JSON-over-HTTP language model
//! whose wire format is only known at runtime:
//!
//! - [`config`] - Typed configuration and model files
//! - [`provider`] - Provider trait, conversation types, path expressions,
//!   payload templating and the configurable adapter
//! - [`tools`] - Discovery and execution of local tool executables
//! - [`agent`] - Sliding-window conversation and the tool-calling loop
//! - [`error`] - Error types shared by all of the above
//!
//! # Quick Start
//!
//! ```no_run
//! use wirechat_core::agent::{AgentConfig, AgentLoop, Conversation};
//! use wirechat_core::config::Config;
//! use wirechat_core::provider::custom::CustomProvider;
//! use wirechat_core::tools::ToolManager;
//!
//! # async fn demo() -> wirechat_core::error::Result<()> {
//! let config = Config::load()?;
//! let model = config.model_config()?.expect("no model configured");
//!
//! let provider = CustomProvider::new(model.resolve()?)?;
//! let tools = ToolManager::discover(&config.tools).await?;
//! let agent = AgentLoop::new(Box::new(provider), tools, AgentConfig::default());
//!
//! let mut conversation = Conversation::new(config.agents.defaults.batch_window);
//! let response = agent.ask(&mut conversation, "How many days until 2027-09-03?").await?;
//! println!("{}", response.text().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod provider;
pub mod tools;
