// Public modules
pub mod accounting;
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod error;
pub mod history;
pub mod observability;
pub mod pane;
pub mod render;
pub mod session;
pub mod sse;
pub mod tokenizer;
pub mod types;

// Re-exports
pub use accounting::{DEFAULT_BUDGET, TokenAccountant, TokenSnapshot};
pub use client::{API_KEY_ENV, ChunkStream, CompletionClient, CompletionService, DEFAULT_API_URL};
pub use client_logger::{ClientLogger, TracingLogger};
pub use error::{Error, Result};
pub use history::{ConversationHistory, DEFAULT_SYSTEM_PROMPT, Message, Role};
pub use observability::register_biometrics;
pub use pane::{ChatPane, PaneOptions};
pub use render::{
    Formatter, IncrementalRenderer, MarkdownFormatter, RenderUpdate, ScrollHint,
};
pub use session::{Conversation, Effect, Pull, SessionState, StreamSession, TurnSummary};
pub use tokenizer::{Encoding, TokenCounter, Tokenizer};
pub use types::*;
