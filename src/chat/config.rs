//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg`, an optional YAML
//! configuration file with the same keys, and the resolved [`ChatConfig`].
//! Values given on the command line win over the file; the file wins over
//! the defaults.

use std::path::{Path, PathBuf};

use arrrg_derive::CommandLine;
use serde::Deserialize;

use crate::accounting::DEFAULT_BUDGET;
use crate::error::{Error, Result};
use crate::history::DEFAULT_SYSTEM_PROMPT;
use crate::pane::PaneOptions;
use crate::tokenizer::Encoding;
use crate::types::{DEFAULT_SEED, Model};

/// Log file used when none is configured.
pub const DEFAULT_LOG_FILE: &str = "chatpane.log";

/// Command-line arguments for the chatpane tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: gpt-3.5-turbo)", "MODEL")]
    pub model: Option<String>,

    /// System prompt to set context for the conversation.
    #[arrrg(optional, "System prompt for the conversation", "PROMPT")]
    pub system: Option<String>,

    /// Token budget for the session.
    #[arrrg(optional, "Session token budget (default: 4096)", "TOKENS")]
    pub budget: Option<u64>,

    /// Token encoding name.
    #[arrrg(optional, "Token encoding (default: cl100k_base)", "ENCODING")]
    pub encoding: Option<String>,

    /// Base URL of the completion service.
    #[arrrg(optional, "Base URL of an OpenAI-compatible API", "URL")]
    pub base_url: Option<String>,

    /// Path to a YAML configuration file.
    #[arrrg(optional, "YAML configuration file", "PATH")]
    pub config: Option<String>,

    /// Where to write logs.
    #[arrrg(optional, "Log file (default: chatpane.log)", "PATH")]
    pub log_file: Option<String>,
}

/// The YAML configuration file.  Every key is optional.
///
/// ```yaml
/// model: gpt-4o-mini
/// system: You answer in haiku.
/// budget: 8192
/// encoding: cl100k_base
/// base_url: http://localhost:11434/v1/
/// log_file: /tmp/chatpane.log
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfigFile {
    pub model: Option<String>,
    pub system: Option<String>,
    pub budget: Option<u64>,
    pub encoding: Option<String>,
    pub base_url: Option<String>,
    pub log_file: Option<String>,
}

impl ChatConfigFile {
    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::io(format!("could not read config {}", path.display()), e)
        })?;
        Self::parse(&text)
    }

    /// Parse configuration from YAML text.  An empty document is an empty
    /// configuration.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Configuration for a chat pane.
///
/// This struct holds the resolved configuration values after merging the
/// command line, the configuration file and the defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// The model to use for generating responses.
    pub model: Model,

    /// System instruction that seeds the conversation.
    pub system_prompt: String,

    /// Token budget for the session.
    pub budget: u64,

    /// Encoding used to count tokens.
    pub encoding: Encoding,

    /// Base URL of the completion service; `None` uses the default endpoint.
    pub base_url: Option<String>,

    /// Where logs are written.
    pub log_file: PathBuf,

    /// Sampling seed sent with every request.
    pub seed: Option<i64>,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Model: gpt-3.5-turbo
    /// - System prompt: "You are a helpful assistant."
    /// - Budget: 4096
    /// - Encoding: cl100k_base
    pub fn new() -> Self {
        Self {
            model: Model::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            budget: DEFAULT_BUDGET,
            encoding: Encoding::default(),
            base_url: None,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            seed: Some(DEFAULT_SEED),
        }
    }

    /// Resolve the command line, reading the file named by `--config` if any.
    pub fn load(args: ChatArgs) -> Result<Self> {
        let file = match args.config.as_deref() {
            Some(path) => Some(ChatConfigFile::load(path)?),
            None => None,
        };
        Self::resolve(args, file)
    }

    /// Merge `args` over `file` over the defaults.
    pub fn resolve(args: ChatArgs, file: Option<ChatConfigFile>) -> Result<Self> {
        let file = file.unwrap_or_default();
        let mut config = Self::new();
        if let Some(model) = args.model.or(file.model) {
            let Ok(model) = model.parse::<Model>();
            config.model = model;
        }
        if let Some(system) = args.system.or(file.system) {
            config.system_prompt = system;
        }
        if let Some(budget) = args.budget.or(file.budget) {
            config.budget = budget;
        }
        if let Some(encoding) = args.encoding.or(file.encoding) {
            config.encoding = encoding.parse()?;
        }
        config.base_url = args.base_url.or(file.base_url);
        if let Some(log_file) = args.log_file.or(file.log_file) {
            config.log_file = PathBuf::from(log_file);
        }
        Ok(config)
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the session token budget.
    pub fn with_budget(mut self, budget: u64) -> Self {
        self.budget = budget;
        self
    }

    /// Sets the token encoding.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Sets the base URL of the completion service.
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    /// Options for a pane whose transcript is `width` columns wide.
    pub fn pane_options(&self, width: u16) -> PaneOptions {
        PaneOptions {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            budget: self.budget,
            seed: self.seed,
            width,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}
