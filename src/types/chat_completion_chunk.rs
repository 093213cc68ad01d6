use serde::{Deserialize, Serialize};

use crate::history::Role;

/// One server-sent chunk of a streamed chat completion, as sent on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Completion identifier shared by all chunks of a reply.
    #[serde(default)]
    pub id: String,

    /// Model that produced the chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Per-choice deltas.  Usage-only chunks carry no choices.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// A single choice within a [`ChatCompletionChunk`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Index of the choice.
    #[serde(default)]
    pub index: u32,

    /// Incremental content for this choice.
    #[serde(default)]
    pub delta: ChunkDelta,

    /// Set on the last chunk of the choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Incremental message content.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Role, sent on the first chunk only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Text fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A reply fragment as seen by the chat session.
///
/// Content may be empty.  An empty fragment is not the end of the reply;
/// only the end of the stream is.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Chunk {
    /// Text to append to the reply.
    pub content: String,
    /// Why the model stopped, when this is its last fragment.
    pub finish_reason: Option<String>,
}

impl Chunk {
    /// Creates a chunk carrying `content`.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: None,
        }
    }

    /// Returns true if the model marked this as its last fragment.
    pub fn is_final(&self) -> bool {
        self.finish_reason.is_some()
    }
}

impl From<ChatCompletionChunk> for Chunk {
    fn from(chunk: ChatCompletionChunk) -> Self {
        match chunk.choices.into_iter().next() {
            Some(choice) => Chunk {
                content: choice.delta.content.unwrap_or_default(),
                finish_reason: choice.finish_reason,
            },
            None => Chunk::default(),
        }
    }
}
