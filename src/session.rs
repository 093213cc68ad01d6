//! One request/response cycle as an explicit state machine.
//!
//! A [`StreamSession`] never loops over its stream.  Each call to
//! [`StreamSession::pull`] waits for exactly one event (a chunk, the end of the
//! stream, an error or cancellation) and [`StreamSession::advance`] turns that
//! event into inert [`Effect`]s.  A host re-arms the next pull only when it sees
//! [`Effect::PullNext`], so it regains control between every chunk.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::accounting::{TokenAccountant, TokenSnapshot};
use crate::client::{ChunkStream, CompletionService};
use crate::error::{Error, Result};
use crate::history::{ConversationHistory, Role};
use crate::observability::{
    SESSION_CANCELS, SESSION_CHUNKS, SESSION_COMMITS, SESSION_DURATION, SESSION_FAILURES,
    SESSION_TTFB, SESSION_TURN_TOKENS,
};
use crate::render::{IncrementalRenderer, RenderUpdate};
use crate::tokenizer::TokenCounter;
use crate::types::{Chunk, CompletionRequest};

type PendingOpen = Pin<Box<dyn Future<Output = Result<ChunkStream>> + Send>>;

//////////////////////////////////////////// State /////////////////////////////////////////////

/// Where a [`StreamSession`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No reply stream is held.
    Idle,
    /// A stream handle was acquired; no chunk has arrived yet.
    Awaiting,
    /// At least one chunk has arrived.
    Streaming,
    /// The reply was appended to the conversation.
    Committed,
    /// The stream failed after it was acquired.
    Failed,
    /// The reply was cancelled.
    Cancelled,
}

impl SessionState {
    /// Returns true if a pull can still change this state.
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Awaiting | SessionState::Streaming)
    }

    /// Returns true once the session is done for good.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Committed | SessionState::Failed | SessionState::Cancelled
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Awaiting => "waiting",
            SessionState::Streaming => "streaming",
            SessionState::Committed => "done",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// The outcome of a single pull.
#[derive(Debug)]
pub enum Pull {
    /// The next reply fragment.
    Chunk(Chunk),
    /// The stream ended normally.
    Exhausted,
    /// Acquiring or reading the stream failed.
    Failed(Error),
    /// The session's cancellation token fired.
    Cancelled,
}

/// Token accounting for a committed exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnSummary {
    /// Tokens in the user message that started the exchange.
    pub prompt_tokens: u64,
    /// Tokens in the assistant reply.
    pub reply_tokens: u64,
    /// The amount recorded against the budget.
    pub delta: u64,
    /// Totals after recording.
    pub snapshot: TokenSnapshot,
}

/// Work for the host loop to perform.  Effects describe work; they never do it.
#[derive(Clone, Debug)]
pub enum Effect {
    /// Show this transcript and scroll as hinted.
    Render(RenderUpdate),
    /// Arm exactly one more pull.
    PullNext,
    /// The reply was committed.
    Committed(TurnSummary),
    /// Show this error to the user.
    Report(Error),
}

impl Effect {
    /// Returns true for [`Effect::PullNext`].
    pub fn is_pull_next(&self) -> bool {
        matches!(self, Effect::PullNext)
    }
}

///////////////////////////////////////// Conversation /////////////////////////////////////////

/// The state every session reads and commits into: the message log, the
/// token totals and the counter that feeds them.
pub struct Conversation {
    history: ConversationHistory,
    accountant: TokenAccountant,
    tokenizer: Arc<dyn TokenCounter>,
}

impl Conversation {
    pub fn new(
        history: ConversationHistory,
        accountant: TokenAccountant,
        tokenizer: Arc<dyn TokenCounter>,
    ) -> Self {
        Self {
            history,
            accountant,
            tokenizer,
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn accountant(&self) -> &TokenAccountant {
        &self.accountant
    }

    pub fn tokenizer(&self) -> &dyn TokenCounter {
        self.tokenizer.as_ref()
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        self.accountant.snapshot()
    }

    /// Tokens in the whole conversation as it would be sent next.
    pub fn context_tokens(&self) -> u64 {
        self.tokenizer.count_messages(self.history.as_slice())
    }

    /// Append a user message and return its token count.
    pub fn add_user(&mut self, content: &str) -> u64 {
        self.history.append(Role::User, content);
        self.tokenizer.count(content)
    }

    fn commit_reply(&mut self, reply: String, prompt_tokens: u64) -> TurnSummary {
        let reply_tokens = self.tokenizer.count(&reply);
        let delta = prompt_tokens.saturating_add(reply_tokens);
        self.history.append(Role::Assistant, reply);
        self.accountant.record_turn(delta);
        TurnSummary {
            prompt_tokens,
            reply_tokens,
            delta,
            snapshot: self.accountant.snapshot(),
        }
    }
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("history", &self.history)
            .field("accountant", &self.accountant)
            .field("encoding", &self.tokenizer.encoding_name())
            .finish()
    }
}

/////////////////////////////////////////// Session ////////////////////////////////////////////

/// A single streamed reply.
pub struct StreamSession {
    state: SessionState,
    pending_reply: String,
    pending_open: Option<PendingOpen>,
    stream: Option<ChunkStream>,
    cancel: CancellationToken,
    prompt_tokens: u64,
    chunks: u64,
    started: Instant,
    accepting: bool,
}

impl StreamSession {
    /// Create an idle session.  `prompt_tokens` is charged together with the
    /// reply when the session commits.
    pub fn new(cancel: CancellationToken, prompt_tokens: u64) -> Self {
        Self {
            state: SessionState::Idle,
            pending_reply: String::new(),
            pending_open: None,
            stream: None,
            cancel,
            prompt_tokens,
            chunks: 0,
            started: Instant::now(),
            accepting: false,
        }
    }

    /// Submit `request` and wait for the reply stream handle.
    ///
    /// On failure the session stays [`SessionState::Idle`] and the error is
    /// [`Error::StreamAcquisitionFailed`].
    pub async fn open(
        &mut self,
        service: &dyn CompletionService,
        request: CompletionRequest,
    ) -> Result<()> {
        if self.state != SessionState::Idle || self.pending_open.is_some() {
            return Err(Error::busy("this session already has a reply stream"));
        }
        let cancel = self.cancel.clone();
        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::abort("request cancelled before the reply started")),
            acquired = service.stream(request) => acquired,
        };
        match acquired {
            Ok(stream) => {
                self.stream = Some(stream);
                self.state = SessionState::Awaiting;
                self.started = Instant::now();
                self.accepting = true;
                Ok(())
            }
            Err(err) => {
                SESSION_FAILURES.click();
                tracing::warn!(error = %err, "could not acquire reply stream");
                Err(as_acquisition_failure(err))
            }
        }
    }

    /// Queue `request` without waiting.  The handle is acquired inside the
    /// first [`pull`](Self::pull), so a host loop stays responsive while the
    /// service accepts the request.
    pub fn begin(&mut self, service: Arc<dyn CompletionService>, request: CompletionRequest) {
        self.pending_open = Some(Box::pin(async move { service.stream(request).await }));
        self.started = Instant::now();
        self.accepting = true;
    }

    /// Wait for the next event on the stream.
    ///
    /// Dropping the returned future before it completes loses nothing; the
    /// next call picks up where this one left off.
    pub async fn pull(&mut self) -> Pull {
        let cancel = self.cancel.clone();
        if let Some(open) = self.pending_open.as_mut() {
            let acquired = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Pull::Cancelled,
                acquired = open => acquired,
            };
            self.pending_open = None;
            match acquired {
                Ok(stream) => {
                    self.stream = Some(stream);
                    self.state = SessionState::Awaiting;
                }
                Err(err) => return Pull::Failed(as_acquisition_failure(err)),
            }
        }
        let Some(stream) = self.stream.as_mut() else {
            return Pull::Failed(Error::stream_acquisition("no reply stream is open", None));
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Pull::Cancelled,
            next = stream.next() => match next {
                Some(Ok(chunk)) => Pull::Chunk(chunk),
                Some(Err(err)) => Pull::Failed(err),
                None => Pull::Exhausted,
            },
        }
    }

    /// Apply the outcome of a pull.  Pulls delivered to a session that was
    /// never opened or has already finished are ignored.
    ///
    /// A failure before the first chunk is reported as
    /// [`Error::StreamAcquisitionFailed`] whether or not a stream was handed
    /// over.  The state records which: `Idle` when no stream was ever
    /// acquired, `Failed` when an acquired stream errored before producing
    /// text.
    pub fn advance(
        &mut self,
        pull: Pull,
        conversation: &mut Conversation,
        renderer: &mut IncrementalRenderer,
    ) -> Vec<Effect> {
        if !self.accepting {
            tracing::debug!(state = %self.state, ?pull, "ignoring pull for inactive session");
            return Vec::new();
        }
        match pull {
            Pull::Chunk(chunk) => {
                if self.chunks == 0 {
                    SESSION_TTFB.add(self.started.elapsed().as_secs_f64());
                }
                self.chunks += 1;
                SESSION_CHUNKS.click();
                tracing::debug!(
                    chunk = self.chunks,
                    bytes = chunk.content.len(),
                    finish_reason = ?chunk.finish_reason,
                    "reply chunk"
                );
                self.state = SessionState::Streaming;
                self.pending_reply.push_str(&chunk.content);
                vec![Effect::Render(renderer.apply(&chunk.content)), Effect::PullNext]
            }
            Pull::Exhausted => {
                self.release();
                let reply = std::mem::take(&mut self.pending_reply);
                let summary = conversation.commit_reply(reply, self.prompt_tokens);
                self.state = SessionState::Committed;
                SESSION_COMMITS.click();
                SESSION_TURN_TOKENS.add(summary.delta as f64);
                SESSION_DURATION.add(self.started.elapsed().as_secs_f64());
                tracing::info!(
                    chunks = self.chunks,
                    prompt_tokens = summary.prompt_tokens,
                    reply_tokens = summary.reply_tokens,
                    used = summary.snapshot.used,
                    remaining = summary.snapshot.remaining,
                    "reply committed"
                );
                vec![
                    Effect::Render(renderer.end_turn()),
                    Effect::Committed(summary),
                ]
            }
            Pull::Failed(err) => {
                let acquired = self.stream.is_some();
                self.release();
                renderer.end_turn();
                SESSION_FAILURES.click();
                let err = if self.chunks == 0 {
                    self.state = if acquired {
                        SessionState::Failed
                    } else {
                        SessionState::Idle
                    };
                    as_acquisition_failure(err)
                } else {
                    self.state = SessionState::Failed;
                    Error::stream_read(
                        "the reply stream failed",
                        self.pending_reply.clone(),
                        Some(err),
                    )
                };
                tracing::warn!(state = %self.state, error = %err, "reply failed");
                vec![Effect::Report(err)]
            }
            Pull::Cancelled => {
                self.release();
                renderer.end_turn();
                self.state = SessionState::Cancelled;
                SESSION_CANCELS.click();
                tracing::info!(chunks = self.chunks, "reply cancelled");
                vec![Effect::Report(Error::abort("reply cancelled"))]
            }
        }
    }

    /// Pull once and apply the result.
    pub async fn step(
        &mut self,
        conversation: &mut Conversation,
        renderer: &mut IncrementalRenderer,
    ) -> Vec<Effect> {
        let pull = self.pull().await;
        self.advance(pull, conversation, renderer)
    }

    /// Fire this session's cancellation token.  The next pull reports
    /// [`Pull::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Reply text received so far.  Cleared on commit.
    pub fn pending_reply(&self) -> &str {
        &self.pending_reply
    }

    /// Returns true while a pull can still change the session.
    pub fn is_active(&self) -> bool {
        self.pending_open.is_some() || self.state.is_active()
    }

    /// Returns true while the session holds a stream handle.
    pub fn holds_stream(&self) -> bool {
        self.stream.is_some() || self.pending_open.is_some()
    }

    fn release(&mut self) {
        self.accepting = false;
        self.pending_open = None;
        self.stream = None;
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("state", &self.state)
            .field("pending_reply", &self.pending_reply)
            .field("holds_stream", &self.holds_stream())
            .field("prompt_tokens", &self.prompt_tokens)
            .field("chunks", &self.chunks)
            .finish()
    }
}

fn as_acquisition_failure(err: Error) -> Error {
    if err.is_stream_acquisition() || err.is_abort() {
        err
    } else {
        Error::stream_acquisition("the completion service did not start a reply", Some(err))
    }
}
