//! Logging hooks for completion client operations.
//!
//! This module provides the [`ClientLogger`] trait that allows callers to
//! capture every request sent through the [`CompletionClient`] and every
//! chunk it streams back.
//!
//! [`CompletionClient`]: crate::CompletionClient

use crate::types::{Chunk, CompletionRequest};

/// A trait for logging completion client operations.
///
/// # Example
///
/// ```rust
/// use std::sync::Mutex;
///
/// use chatpane::{Chunk, ClientLogger, CompletionRequest};
///
/// #[derive(Default)]
/// struct Transcript {
///     lines: Mutex<Vec<String>>,
/// }
///
/// impl ClientLogger for Transcript {
///     fn log_request(&self, request: &CompletionRequest) {
///         let mut lines = self.lines.lock().unwrap();
///         lines.push(format!("request with {} messages", request.messages.len()));
///     }
///
///     fn log_chunk(&self, chunk: &Chunk) {
///         self.lines.lock().unwrap().push(chunk.content.clone());
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log a request just before it is sent.
    fn log_request(&self, request: &CompletionRequest);

    /// Log a chunk as it is received.
    fn log_chunk(&self, chunk: &Chunk);
}

/// A [`ClientLogger`] that emits `tracing` events at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl ClientLogger for TracingLogger {
    fn log_request(&self, request: &CompletionRequest) {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            seed = ?request.seed,
            "sending completion request"
        );
    }

    fn log_chunk(&self, chunk: &Chunk) {
        tracing::debug!(
            bytes = chunk.content.len(),
            finish_reason = ?chunk.finish_reason,
            "received chunk"
        );
    }
}
