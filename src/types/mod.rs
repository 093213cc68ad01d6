// Public modules
pub mod chat_completion_chunk;
pub mod completion_request;
pub mod model;

// Re-exports
pub use chat_completion_chunk::{ChatCompletionChunk, Chunk, ChunkChoice, ChunkDelta};
pub use completion_request::{CompletionRequest, DEFAULT_SEED};
pub use model::{KnownModel, Model};
