//! Terminal-independent state of the chat application.
//!
//! [`ChatApp`] turns terminal events into pane operations and pane effects
//! into display state.  It never touches the terminal itself, so every key
//! binding can be exercised without one.

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEventKind};
use ratatui::text::Text;
use tui_input::Input;
use tui_input::backend::crossterm::EventHandler;

use crate::chat::commands::{ChatCommand, help_text, parse_command};
use crate::pane::ChatPane;
use crate::session::{Effect, Pull};
use crate::types::Model;

/// Lines moved per PageUp/PageDown.
const PAGE: usize = 10;
/// Lines moved per mouse wheel notch.
const WHEEL: usize = 3;

/// Application state driven by the event loop.
pub struct ChatApp {
    pane: ChatPane,
    input: Input,
    focused: bool,
    transcript: Text<'static>,
    scroll_offset: usize,
    pull_armed: bool,
    quit: bool,
}

impl ChatApp {
    pub fn new(pane: ChatPane) -> Self {
        let transcript = pane.refresh().text;
        Self {
            pane,
            input: Input::default(),
            focused: true,
            transcript,
            scroll_offset: 0,
            pull_armed: false,
            quit: false,
        }
    }

    /// Handle one terminal event.
    pub fn handle_event(&mut self, event: &Event) {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::ScrollUp => self.scroll_up(WHEEL),
                MouseEventKind::ScrollDown => self.scroll_down(WHEEL),
                _ => {}
            },
            Event::Resize(width, _) => self.resize(*width),
            _ => {}
        }
    }

    fn handle_key(&mut self, key: &KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit = true;
            return;
        }
        match key.code {
            KeyCode::Esc => self.focused = !self.focused,
            KeyCode::PageUp => self.scroll_up(PAGE),
            KeyCode::PageDown => self.scroll_down(PAGE),
            KeyCode::Up if !self.focused => self.scroll_up(1),
            KeyCode::Down if !self.focused => self.scroll_down(1),
            KeyCode::Enter if self.focused => {
                if self.input.value().trim().is_empty() {
                    return;
                }
                let line = self.input.value().to_string();
                self.input.reset();
                self.submit(&line);
            }
            _ if self.focused => {
                self.input.handle_event(&Event::Key(*key));
            }
            _ => {}
        }
    }

    /// Run a slash command or send a message.
    pub fn submit(&mut self, line: &str) {
        match parse_command(line) {
            Some(command) => self.run_command(command),
            None => {
                let effects = self.pane.submit(line);
                self.apply(effects);
            }
        }
    }

    fn run_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::Quit => self.quit = true,
            ChatCommand::Help => self.note(help_text()),
            ChatCommand::Stats => {
                let stats = format!(
                    "{}\nContext: {} tokens ({})",
                    self.pane.snapshot(),
                    self.pane.context_tokens(),
                    self.pane.encoding_name()
                );
                self.note(&stats);
            }
            ChatCommand::Model(name) => {
                let Ok(model) = name.parse::<Model>();
                self.pane.set_model(model);
                self.note(&format!("Model changed to: {name}"));
            }
            ChatCommand::Cancel => {
                let effects = self.pane.cancel();
                if effects.is_empty() {
                    self.note("Nothing to cancel.");
                }
                self.apply(effects);
            }
            ChatCommand::Invalid(message) => self.note(&message),
        }
    }

    /// Interpret effects returned by the pane.
    pub fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Render(update) => {
                    self.transcript = update.text;
                    self.scroll_offset = 0;
                }
                Effect::PullNext => self.pull_armed = true,
                Effect::Committed(summary) => {
                    tracing::debug!(delta = summary.delta, "turn committed");
                }
                Effect::Report(err) => {
                    tracing::warn!(error = %err, "reported to user");
                    match err.hint() {
                        Some(hint) => self.note(&format!("{err}\nHint: {hint}")),
                        None => self.note(&err.to_string()),
                    }
                }
            }
        }
    }

    /// Deliver the result of an armed pull.
    pub fn on_pull(&mut self, pull: Option<Pull>) {
        self.pull_armed = false;
        if let Some(pull) = pull {
            let effects = self.pane.handle_pull(pull);
            self.apply(effects);
        }
    }

    fn note(&mut self, text: &str) {
        self.transcript = self.pane.note(text).text;
        self.scroll_offset = 0;
    }

    /// Reflow the transcript for a terminal `width` columns wide.
    pub fn resize(&mut self, width: u16) {
        // Two columns go to the transcript border.
        self.transcript = self.pane.set_width(width.saturating_sub(2)).text;
    }

    fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(lines);
    }

    fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    /// Clamp the scroll offset for a viewport `visible` lines tall and return
    /// the first line to show.
    pub fn scroll_top(&mut self, visible: usize) -> usize {
        let max_scroll = self.transcript.lines.len().saturating_sub(visible);
        self.scroll_offset = self.scroll_offset.min(max_scroll);
        max_scroll - self.scroll_offset
    }

    pub fn pane(&self) -> &ChatPane {
        &self.pane
    }

    pub fn pane_mut(&mut self) -> &mut ChatPane {
        &mut self.pane
    }

    pub fn input(&self) -> &Input {
        &self.input
    }

    pub fn transcript(&self) -> &Text<'static> {
        &self.transcript
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn pull_armed(&self) -> bool {
        self.pull_armed
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Release the stream in flight before exiting.
    pub fn shutdown(&mut self) {
        self.pull_armed = false;
        self.pane.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crossterm::event::{KeyEventState, MouseEvent};
    use futures::stream;

    use super::*;
    use crate::client::{ChunkStream, CompletionService};
    use crate::pane::PaneOptions;
    use crate::session::SessionState;
    use crate::tokenizer::TokenCounter;
    use crate::types::{Chunk, CompletionRequest};
    use crate::{Error, Result};

    struct CharCounter;

    impl TokenCounter for CharCounter {
        fn encoding_name(&self) -> &str {
            "chars"
        }

        fn count(&self, text: &str) -> u64 {
            text.chars().count() as u64
        }
    }

    struct Echo;

    struct Throttled;

    #[async_trait::async_trait]
    impl CompletionService for Throttled {
        async fn stream(&self, _: CompletionRequest) -> Result<ChunkStream> {
            Err(Error::rate_limit("too many requests", Some(20)))
        }
    }

    #[async_trait::async_trait]
    impl CompletionService for Echo {
        async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
            let last = request
                .messages
                .last()
                .map(|m| m.content().to_string())
                .ok_or_else(|| Error::validation("empty conversation", None))?;
            Ok(Box::pin(stream::iter(vec![Ok(Chunk::text(last))])))
        }
    }

    fn app() -> ChatApp {
        let pane = ChatPane::new(Arc::new(Echo), Arc::new(CharCounter), PaneOptions::default());
        ChatApp::new(pane)
    }

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn type_text(app: &mut ChatApp, text: &str) {
        for c in text.chars() {
            app.handle_event(&key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn ctrl_c_quits() {
        let mut app = app();
        app.handle_event(&Event::Key(KeyEvent::new(
            KeyCode::Char('c'),
            KeyModifiers::CONTROL,
        )));
        assert!(app.should_quit());
    }

    #[test]
    fn escape_toggles_focus() {
        let mut app = app();
        assert!(app.is_focused());
        app.handle_event(&key(KeyCode::Esc));
        assert!(!app.is_focused());
        type_text(&mut app, "ignored");
        assert_eq!(app.input().value(), "");
        app.handle_event(&key(KeyCode::Esc));
        type_text(&mut app, "hi");
        assert_eq!(app.input().value(), "hi");
    }

    #[test]
    fn enter_submits_non_empty_input() {
        let mut app = app();
        app.handle_event(&key(KeyCode::Enter));
        assert!(!app.pull_armed());
        assert_eq!(app.pane().history().len(), 1);

        type_text(&mut app, "ping");
        app.handle_event(&key(KeyCode::Enter));
        assert_eq!(app.input().value(), "");
        assert!(app.pull_armed());
        assert_eq!(app.pane().history().last().unwrap().content(), "ping");
    }

    #[test]
    fn enter_without_focus_does_nothing() {
        let mut app = app();
        type_text(&mut app, "ping");
        app.handle_event(&key(KeyCode::Esc));
        app.handle_event(&key(KeyCode::Enter));
        assert!(!app.pull_armed());
        assert_eq!(app.input().value(), "ping");
    }

    #[tokio::test]
    async fn armed_pull_runs_to_commit() {
        let mut app = app();
        app.submit("ping");
        while app.pull_armed() {
            let pull = app.pane_mut().pull().await;
            app.on_pull(pull);
        }
        assert_eq!(app.pane().state(), SessionState::Idle);
        assert_eq!(app.pane().history().last().unwrap().content(), "ping");
        assert_eq!(app.pane().snapshot().turns, 1);
        assert_eq!(app.pane().snapshot().used, 8);
    }

    #[tokio::test]
    async fn rate_limit_failure_shows_a_hint() {
        let pane = ChatPane::new(
            Arc::new(Throttled),
            Arc::new(CharCounter),
            PaneOptions::default(),
        );
        let mut app = ChatApp::new(pane);
        app.submit("ping");
        while app.pull_armed() {
            let pull = app.pane_mut().pull().await;
            app.on_pull(pull);
        }
        let text: Vec<String> = app
            .transcript()
            .lines
            .iter()
            .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect();
        assert!(
            text.iter().any(|l| l.starts_with("Hint: rate limited")),
            "{text:?}"
        );
        assert_eq!(app.pane().snapshot().turns, 0);
    }

    #[test]
    fn commands_are_not_sent() {
        let mut app = app();
        app.submit("/model gpt-4o");
        assert_eq!(app.pane().model(), &"gpt-4o".parse::<Model>().unwrap());
        app.submit("/stats");
        app.submit("/nonsense");
        assert_eq!(app.pane().history().len(), 1);
        assert!(!app.pull_armed());
        app.submit("/quit");
        assert!(app.should_quit());
    }

    #[test]
    fn scrolling_is_clamped() {
        let mut app = app();
        app.submit("/help");
        let lines = app.transcript().lines.len();
        assert!(lines > 5);
        assert_eq!(app.scroll_top(5), lines - 5);

        app.handle_event(&Event::Mouse(MouseEvent {
            kind: MouseEventKind::ScrollUp,
            column: 0,
            row: 0,
            modifiers: KeyModifiers::NONE,
        }));
        assert_eq!(app.scroll_top(5), lines - 5 - WHEEL);

        app.handle_event(&key(KeyCode::PageUp));
        app.handle_event(&key(KeyCode::PageUp));
        app.handle_event(&key(KeyCode::PageUp));
        assert_eq!(app.scroll_top(5), 0);

        app.handle_event(&key(KeyCode::PageDown));
        assert!(app.scroll_top(5) > 0);
    }
}
