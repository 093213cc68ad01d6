//! Terminal chat pane for OpenAI-compatible chat-completion endpoints.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with default settings (reads OPENAI_API_KEY)
//! chatpane
//!
//! # Specify a model and a larger budget
//! chatpane --model gpt-4o-mini --budget 16384
//!
//! # Talk to a local server, settings from a file
//! chatpane --config chatpane.yaml --base-url http://localhost:11434/v1/
//! ```
//!
//! # Keys
//!
//! - `Enter` sends the message, `Esc` toggles input focus
//! - `PageUp`/`PageDown` and the mouse wheel scroll the transcript
//! - `Ctrl+C` quits
//!
//! Logs go to `chatpane.log` unless `--log-file` says otherwise.

use std::io;
use std::sync::Arc;

use arrrg::CommandLine;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture, Event, EventStream};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures::StreamExt;
use ratatui::Terminal;
use ratatui::backend::{Backend, CrosstermBackend};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use chatpane::chat::{ChatApp, ChatArgs, ChatConfig, draw};
use chatpane::{ChatPane, CompletionClient, Pull, Tokenizer, TracingLogger};

/// What woke the event loop.
enum Msg {
    Terminal(Option<io::Result<Event>>),
    Pull(Option<Pull>),
}

/// Main entry point for the chatpane application.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, free) = ChatArgs::from_command_line_relaxed("chatpane [OPTIONS]");
    if !free.is_empty() {
        eprintln!("ignoring unexpected arguments: {}", free.join(" "));
    }
    let config = ChatConfig::load(args)?;

    let log_file = std::fs::File::create(&config.log_file)?;
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();
    tracing::info!(model = %config.model, budget = config.budget, "starting chatpane");

    let tokenizer = Tokenizer::load(config.encoding)?;
    let client = CompletionClient::with_options(None, config.base_url.clone(), None)?
        .with_logger(Arc::new(TracingLogger));
    let (width, _) = crossterm::terminal::size()?;
    let pane = ChatPane::new(
        Arc::new(client),
        Arc::new(tokenizer),
        config.pane_options(width.saturating_sub(2)),
    );
    let mut app = ChatApp::new(pane);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = run(&mut terminal, &mut app).await;
    app.shutdown();

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = &result {
        tracing::error!(error = %err, "event loop failed");
    }
    tracing::info!(stats = %app.pane().snapshot(), "exiting");
    Ok(result?)
}

/// Draw, then wait for either a terminal event or the one armed pull.
async fn run<B: Backend>(terminal: &mut Terminal<B>, app: &mut ChatApp) -> io::Result<()> {
    let mut events = EventStream::new();
    loop {
        terminal.draw(|f| draw(f, app))?;
        if app.should_quit() {
            return Ok(());
        }

        let armed = app.pull_armed();
        let msg = tokio::select! {
            event = events.next() => Msg::Terminal(event),
            pull = app.pane_mut().pull(), if armed => Msg::Pull(pull),
        };

        match msg {
            Msg::Terminal(Some(Ok(event))) => app.handle_event(&event),
            Msg::Terminal(Some(Err(err))) => return Err(err),
            Msg::Terminal(None) => return Ok(()),
            Msg::Pull(pull) => app.on_pull(pull),
        }
    }
}
