//! The chat pane: one conversation, one renderer and at most one reply in
//! flight.
//!
//! [`ChatPane`] is the only object a host loop talks to.  It owns everything a
//! turn touches, so there is no shared state and no locking; the host only has
//! to interpret the [`Effect`]s it returns and re-arm [`ChatPane::pull`] on
//! [`Effect::PullNext`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::accounting::{DEFAULT_BUDGET, TokenAccountant, TokenSnapshot};
use crate::client::CompletionService;
use crate::error::Error;
use crate::history::{ConversationHistory, DEFAULT_SYSTEM_PROMPT};
use crate::observability::SESSION_REJECTED;
use crate::render::{DEFAULT_WIDTH, IncrementalRenderer, RenderUpdate};
use crate::session::{Conversation, Effect, Pull, SessionState, StreamSession};
use crate::tokenizer::TokenCounter;
use crate::types::{CompletionRequest, DEFAULT_SEED, Model};

/// Settings fixed when a pane is created.
#[derive(Clone, Debug, PartialEq)]
pub struct PaneOptions {
    pub model: Model,
    pub system_prompt: String,
    pub budget: u64,
    pub seed: Option<i64>,
    pub width: u16,
}

impl Default for PaneOptions {
    fn default() -> Self {
        Self {
            model: Model::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            budget: DEFAULT_BUDGET,
            seed: Some(DEFAULT_SEED),
            width: DEFAULT_WIDTH,
        }
    }
}

/// A chat conversation bound to a completion service.
pub struct ChatPane {
    conversation: Conversation,
    renderer: IncrementalRenderer,
    service: Arc<dyn CompletionService>,
    model: Model,
    seed: Option<i64>,
    session: Option<StreamSession>,
    root: CancellationToken,
}

impl ChatPane {
    pub fn new(
        service: Arc<dyn CompletionService>,
        tokenizer: Arc<dyn TokenCounter>,
        options: PaneOptions,
    ) -> Self {
        let conversation = Conversation::new(
            ConversationHistory::with_system_prompt(options.system_prompt),
            TokenAccountant::new(options.budget),
            tokenizer,
        );
        Self {
            conversation,
            renderer: IncrementalRenderer::new(options.width),
            service,
            model: options.model,
            seed: options.seed,
            session: None,
            root: CancellationToken::new(),
        }
    }

    /// Send `input` as the next user message.
    ///
    /// Blank input is ignored.  While a reply is streaming the input is
    /// rejected with [`Error::Busy`] and the conversation is left untouched.
    pub fn submit(&mut self, input: &str) -> Vec<Effect> {
        let input = input.trim();
        if input.is_empty() {
            return Vec::new();
        }
        if self.is_streaming() {
            SESSION_REJECTED.click();
            tracing::debug!("rejecting input while a reply is streaming");
            return vec![Effect::Report(Error::busy(
                "a reply is still streaming; wait for it or type /cancel",
            ))];
        }

        let prompt_tokens = self.conversation.add_user(input);
        let update = self.renderer.begin_turn(input);
        let request = CompletionRequest::new(
            self.model.clone(),
            self.conversation.history().snapshot(),
        )
        .with_seed(self.seed);
        tracing::info!(
            model = %self.model,
            messages = request.messages.len(),
            prompt_tokens,
            "submitting user message"
        );

        let mut session = StreamSession::new(self.root.child_token(), prompt_tokens);
        session.begin(Arc::clone(&self.service), request);
        self.session = Some(session);
        vec![Effect::Render(update), Effect::PullNext]
    }

    /// Wait for the next event of the reply in flight.  Returns `None` when
    /// nothing is streaming.
    pub async fn pull(&mut self) -> Option<Pull> {
        match self.session.as_mut() {
            Some(session) if session.is_active() => Some(session.pull().await),
            _ => None,
        }
    }

    /// Apply a pull returned by [`pull`](Self::pull).
    pub fn handle_pull(&mut self, pull: Pull) -> Vec<Effect> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let effects = session.advance(pull, &mut self.conversation, &mut self.renderer);
        if !session.is_active() {
            self.session = None;
        }
        effects
    }

    /// Cancel the reply in flight, if any.  Nothing is committed.
    pub fn cancel(&mut self) -> Vec<Effect> {
        match self.session.as_ref() {
            Some(session) if session.is_active() => {
                session.cancel();
                self.handle_pull(Pull::Cancelled)
            }
            _ => Vec::new(),
        }
    }

    /// Cancel everything this pane started and release any open stream.
    pub fn shutdown(&mut self) {
        self.root.cancel();
        if let Some(session) = self.session.take() {
            tracing::info!(state = %session.state(), "dropping reply on shutdown");
        }
    }

    /// Append an informational line to the transcript.
    pub fn note(&mut self, text: &str) -> RenderUpdate {
        self.renderer.note(text)
    }

    /// The transcript as it stands.
    pub fn refresh(&self) -> RenderUpdate {
        self.renderer.refresh()
    }

    /// Reflow the transcript for a new viewport width.
    pub fn set_width(&mut self, width: u16) -> RenderUpdate {
        self.renderer.set_width(width);
        self.renderer.refresh()
    }

    pub fn history(&self) -> &ConversationHistory {
        self.conversation.history()
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        self.conversation.snapshot()
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Use `model` for the next request.  A reply already streaming is not
    /// affected.
    pub fn set_model(&mut self, model: Model) {
        tracing::info!(from = %self.model, to = %model, "switching model");
        self.model = model;
    }

    pub fn is_streaming(&self) -> bool {
        self.session.as_ref().is_some_and(StreamSession::is_active)
    }

    /// State of the reply in flight, or idle.
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, StreamSession::state)
    }

    /// Tokens the whole conversation would cost if sent now.
    pub fn context_tokens(&self) -> u64 {
        self.conversation.context_tokens()
    }

    pub fn encoding_name(&self) -> &str {
        self.conversation.tokenizer().encoding_name()
    }
}

impl std::fmt::Debug for ChatPane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatPane")
            .field("conversation", &self.conversation)
            .field("model", &self.model)
            .field("session", &self.session)
            .finish()
    }
}

impl Drop for ChatPane {
    fn drop(&mut self) {
        self.root.cancel();
    }
}
