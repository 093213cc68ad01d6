//! Chat application module for the terminal chat pane.
//!
//! This module provides the interactive front end built on top of
//! [`ChatPane`](crate::ChatPane). It supports:
//!
//! - Streaming replies rendered as they arrive
//! - Slash commands for session control
//! - Configuration from the command line and a YAML file
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: Slash command parsing
//! - [`app`]: Key handling and display state
//! - [`view`]: Drawing with `ratatui`

pub mod app;
pub mod commands;
pub mod config;
pub mod view;

pub use app::ChatApp;
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, ChatConfigFile, DEFAULT_LOG_FILE};
pub use view::{draw, status_line};
