//! Drawing the chat application with `ratatui`.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Margin, Rect};
use ratatui::style::{Color, Style};
use ratatui::widgets::{
    Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState,
};

use crate::chat::app::ChatApp;
use crate::pane::ChatPane;

/// Rows taken by the input box.
const INPUT_HEIGHT: u16 = 3;
/// Rows taken by the status bar.
const STATUS_HEIGHT: u16 = 1;

/// Split the frame into transcript, input and status rows.
pub fn layout(area: Rect) -> [Rect; 3] {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(INPUT_HEIGHT),
            Constraint::Length(STATUS_HEIGHT),
        ])
        .split(area);
    [chunks[0], chunks[1], chunks[2]]
}

/// Status bar text: model, reply state, tokens used and share of the budget.
pub fn status_line(pane: &ChatPane, focused: bool) -> String {
    let snapshot = pane.snapshot();
    let focus = if focused { "typing" } else { "scrolling" };
    format!(
        " {} | {} | Tokens Used: {} | % Used: {:.1}% | {} ",
        pane.model(),
        pane.state(),
        snapshot.used,
        snapshot.percent_used,
        focus,
    )
}

pub fn draw(f: &mut Frame, app: &mut ChatApp) {
    let [transcript_area, input_area, status_area] = layout(f.area());

    let total_lines = app.transcript().lines.len();
    let visible_height = transcript_area.height.saturating_sub(2) as usize;
    let top = app.scroll_top(visible_height);
    let max_scroll = total_lines.saturating_sub(visible_height);

    let transcript = Paragraph::new(app.transcript().clone())
        .block(Block::default().borders(Borders::ALL).title("Chat"))
        .scroll((top.min(u16::MAX as usize) as u16, 0));
    f.render_widget(transcript, transcript_area);

    if total_lines > visible_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight);
        let mut scrollbar_state = ScrollbarState::new(max_scroll).position(top);
        let scrollbar_area = transcript_area.inner(Margin {
            vertical: 1,
            horizontal: 0,
        });
        f.render_stateful_widget(scrollbar, scrollbar_area, &mut scrollbar_state);
    }

    let border = if app.is_focused() {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let scroll = app.input().visual_scroll(inner_width);
    let input = Paragraph::new(app.input().value())
        .style(Style::default().fg(Color::White))
        .scroll((0, scroll.min(u16::MAX as usize) as u16))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border)
                .title("Message (/help for commands, Esc to scroll)"),
        );
    f.render_widget(input, input_area);

    let status = Paragraph::new(status_line(app.pane(), app.is_focused()))
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(status, status_area);

    if app.is_focused() {
        let cursor = app.input().visual_cursor().saturating_sub(scroll);
        f.set_cursor_position((
            input_area.x + cursor.min(inner_width) as u16 + 1,
            input_area.y + 1,
        ));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    use super::*;
    use crate::client::{ChunkStream, CompletionService};
    use crate::pane::PaneOptions;
    use crate::tokenizer::TokenCounter;
    use crate::types::CompletionRequest;
    use crate::{Error, Result};

    struct Offline;

    #[async_trait::async_trait]
    impl CompletionService for Offline {
        async fn stream(&self, _: CompletionRequest) -> Result<ChunkStream> {
            Err(Error::connection("offline", None))
        }
    }

    struct ByteCounter;

    impl TokenCounter for ByteCounter {
        fn encoding_name(&self) -> &str {
            "bytes"
        }

        fn count(&self, text: &str) -> u64 {
            text.len() as u64
        }
    }

    fn pane() -> ChatPane {
        ChatPane::new(Arc::new(Offline), Arc::new(ByteCounter), PaneOptions::default())
    }

    #[test]
    fn layout_reserves_input_and_status() {
        let [transcript, input, status] = layout(Rect::new(0, 0, 80, 24));
        assert_eq!(transcript.height, 20);
        assert_eq!(input.height, 3);
        assert_eq!(status.height, 1);
    }

    #[test]
    fn status_line_shows_tokens() {
        let line = status_line(&pane(), true);
        assert!(line.contains("gpt-3.5-turbo"));
        assert!(line.contains("idle"));
        assert!(line.contains("Tokens Used: 0"));
        assert!(line.contains("% Used: 0.0%"));
    }

    #[test]
    fn draws_without_panicking() {
        let mut app = ChatApp::new(pane());
        app.resize(40);
        app.submit("/help");
        let mut terminal = Terminal::new(TestBackend::new(40, 12)).unwrap();
        terminal.draw(|f| draw(f, &mut app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        let last_row: String = (0..40)
            .map(|x| buffer[(x, 11)].symbol().to_string())
            .collect();
        assert!(last_row.contains("Tokens Used"));
    }
}
