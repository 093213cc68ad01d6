//! Incremental rendering of a streamed reply.
//!
//! The [`IncrementalRenderer`] accumulates markdown fragments as they arrive
//! and re-formats the whole transcript on every update.  Formatting is
//! delegated to a [`Formatter`]; [`MarkdownFormatter`] is a small
//! line-oriented implementation that styles headings, lists, block quotes,
//! fenced code and inline code, and word-wraps to the viewport width.

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Width used until the host reports the real viewport width.
pub const DEFAULT_WIDTH: u16 = 80;

///////////////////////////////////////// Updates //////////////////////////////////////////

/// Where the viewport should be scrolled after an update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScrollHint {
    /// Follow the newest content.
    #[default]
    Bottom,
}

/// A formatted view of the transcript, ready to hand to the display.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderUpdate {
    /// The formatted transcript.
    pub text: Text<'static>,
    /// Scroll instruction.
    pub scroll: ScrollHint,
}

impl RenderUpdate {
    /// Number of display lines in the update.
    pub fn height(&self) -> usize {
        self.text.lines.len()
    }
}

//////////////////////////////////////// Formatting ////////////////////////////////////////

/// Turns markdown into styled terminal text.
pub trait Formatter: Send {
    /// Format `markdown` for a viewport `width` columns wide.  A width of zero
    /// disables wrapping.
    fn format(&self, markdown: &str, width: u16) -> Text<'static>;
}

/// Line-oriented markdown formatter.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarkdownFormatter;

impl MarkdownFormatter {
    fn heading_level(line: &str) -> Option<usize> {
        let level = line.chars().take_while(|c| *c == '#').count();
        if (1..=6).contains(&level) && line[level..].starts_with(' ') {
            Some(level)
        } else {
            None
        }
    }

    fn list_marker(line: &str) -> Option<(String, &str)> {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();
        for bullet in ["- ", "* ", "+ "] {
            if let Some(rest) = trimmed.strip_prefix(bullet) {
                return Some((format!("{}• ", " ".repeat(indent)), rest));
            }
        }
        let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits > 0 {
            if let Some(rest) = trimmed[digits..].strip_prefix(". ") {
                return Some((format!("{}{}. ", " ".repeat(indent), &trimmed[..digits]), rest));
            }
        }
        None
    }

    fn is_note(line: &str) -> bool {
        line.len() >= 2 && line.starts_with('_') && line.ends_with('_')
    }

    /// Style inline code spans.  `in_code` carries an open backtick span
    /// across wrapped lines.
    fn inline(text: &str, base: Style, in_code: &mut bool) -> Vec<Span<'static>> {
        let code = Style::default().fg(Color::Magenta);
        let mut spans = Vec::new();
        for (idx, piece) in text.split('`').enumerate() {
            if idx > 0 {
                *in_code = !*in_code;
            }
            if piece.is_empty() {
                continue;
            }
            let style = if *in_code { code } else { base };
            spans.push(Span::styled(piece.to_string(), style));
        }
        spans
    }

    fn push_wrapped(
        lines: &mut Vec<Line<'static>>,
        prefix: &str,
        prefix_style: Style,
        body: &str,
        base: Style,
        width: u16,
    ) {
        let prefix_width = prefix.width();
        let available = (width as usize).saturating_sub(prefix_width);
        let continuation = " ".repeat(prefix_width);
        let mut in_code = false;
        for (idx, row) in wrap(body, if width == 0 { 0 } else { available.max(1) })
            .into_iter()
            .enumerate()
        {
            let lead = if idx == 0 { prefix } else { continuation.as_str() };
            let mut spans = Vec::new();
            if !lead.is_empty() {
                spans.push(Span::styled(lead.to_string(), prefix_style));
            }
            spans.extend(Self::inline(&row, base, &mut in_code));
            lines.push(Line::from(spans));
        }
    }
}

impl Formatter for MarkdownFormatter {
    fn format(&self, markdown: &str, width: u16) -> Text<'static> {
        let fence = Style::default().fg(Color::DarkGray);
        let mut lines: Vec<Line<'static>> = Vec::new();
        let mut in_fence = false;

        for line in markdown.split('\n') {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                lines.push(Line::from(Span::styled(line.to_string(), fence)));
                continue;
            }
            if in_fence {
                for row in wrap_hard(line, width as usize) {
                    lines.push(Line::from(Span::styled(row, fence)));
                }
                continue;
            }
            if line.trim().is_empty() {
                lines.push(Line::default());
                continue;
            }
            if let Some(level) = Self::heading_level(line) {
                let mut style = Style::default().fg(Color::Yellow);
                if level == 1 {
                    style = style.add_modifier(Modifier::BOLD);
                }
                Self::push_wrapped(&mut lines, "", style, line, style, width);
            } else if let Some(rest) = line.strip_prefix('>') {
                let quote = Style::default().fg(Color::Cyan);
                let body = rest.strip_prefix(' ').unwrap_or(rest);
                Self::push_wrapped(&mut lines, "│ ", quote, body, quote, width);
            } else if let Some((marker, rest)) = Self::list_marker(line) {
                let bullet = Style::default().fg(Color::Cyan);
                Self::push_wrapped(&mut lines, &marker, bullet, rest, Style::default(), width);
            } else if Self::is_note(line) {
                let note = Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC);
                let body = &line[1..line.len() - 1];
                Self::push_wrapped(&mut lines, "", note, body, note, width);
            } else {
                Self::push_wrapped(&mut lines, "", Style::default(), line, Style::default(), width);
            }
        }

        Text::from(lines)
    }
}

/// Greedy word wrap by display width.  Words wider than `width` are split.
/// A width of zero returns the line unchanged.
fn wrap(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }
    let mut rows = Vec::new();
    let mut current = String::new();
    let mut current_width = 0;
    for word in text.split(' ') {
        let word_width = word.width();
        let needed = if current_width == 0 {
            word_width
        } else {
            current_width + 1 + word_width
        };
        if needed <= width {
            if current_width > 0 {
                current.push(' ');
            }
            current.push_str(word);
            current_width = needed;
            continue;
        }
        if current_width > 0 {
            rows.push(std::mem::take(&mut current));
            current_width = 0;
        }
        let mut pieces = wrap_hard(word, width);
        if let Some(last) = pieces.pop() {
            rows.extend(pieces);
            current_width = last.width();
            current = last;
        }
    }
    rows.push(current);
    rows
}

/// Split `text` into rows no wider than `width` columns.  A character wider
/// than the whole row gets a row of its own.
fn wrap_hard(text: &str, width: usize) -> Vec<String> {
    if width == 0 || text.width() <= width {
        return vec![text.to_string()];
    }
    let mut rows = Vec::new();
    let mut current = String::new();
    let mut current_width = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if current_width + w > width && !current.is_empty() {
            rows.push(std::mem::take(&mut current));
            current_width = 0;
        }
        current.push(c);
        current_width += w;
    }
    if !current.is_empty() {
        rows.push(current);
    }
    rows
}

///////////////////////////////////////// Renderer /////////////////////////////////////////

/// Accumulates streamed markdown and formats the transcript on every update.
///
/// Between [`begin_turn`](IncrementalRenderer::begin_turn) and
/// [`end_turn`](IncrementalRenderer::end_turn) the reply owns the end of the
/// buffer.  Notes written in that window are held below the reply and folded
/// into the buffer when the turn ends.
pub struct IncrementalRenderer {
    buffer: String,
    held: String,
    in_turn: bool,
    width: u16,
    formatter: Box<dyn Formatter>,
}

impl IncrementalRenderer {
    /// Create a renderer using [`MarkdownFormatter`].
    pub fn new(width: u16) -> Self {
        Self::with_formatter(Box::new(MarkdownFormatter), width)
    }

    /// Create a renderer using a caller-supplied formatter.
    pub fn with_formatter(formatter: Box<dyn Formatter>, width: u16) -> Self {
        Self {
            buffer: String::new(),
            held: String::new(),
            in_turn: false,
            width,
            formatter,
        }
    }

    /// Append `fragment` and return the re-formatted transcript.  An empty
    /// fragment leaves the buffer as is but still produces an update.
    pub fn apply(&mut self, fragment: &str) -> RenderUpdate {
        self.buffer.push_str(fragment);
        self.refresh()
    }

    /// Format the current buffer, and any held notes, without changing it.
    pub fn refresh(&self) -> RenderUpdate {
        let text = if self.held.is_empty() {
            self.formatter.format(&self.buffer, self.width)
        } else {
            let mut markdown = self.buffer.clone();
            separate(&mut markdown);
            markdown.push_str(&self.held);
            self.formatter.format(&markdown, self.width)
        };
        RenderUpdate {
            text,
            scroll: ScrollHint::Bottom,
        }
    }

    /// The raw markdown accumulated so far, without held notes.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// The width the transcript is wrapped to.
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Reflow for a new viewport width.
    pub fn set_width(&mut self, width: u16) {
        self.width = width;
    }

    /// Echo a user prompt into the transcript as a block quote and leave the
    /// buffer ready for the reply.
    pub fn begin_turn(&mut self, prompt: &str) -> RenderUpdate {
        self.fold_held();
        separate(&mut self.buffer);
        for line in prompt.lines() {
            self.buffer.push_str("> ");
            self.buffer.push_str(line);
            self.buffer.push('\n');
        }
        self.buffer.push('\n');
        self.in_turn = true;
        self.refresh()
    }

    /// Close the reply opened by [`begin_turn`](Self::begin_turn) and move
    /// held notes below it.
    pub fn end_turn(&mut self) -> RenderUpdate {
        self.in_turn = false;
        self.fold_held();
        self.refresh()
    }

    /// Returns true between `begin_turn` and `end_turn`.
    pub fn in_turn(&self) -> bool {
        self.in_turn
    }

    /// Append an informational line, such as an error or a stats report.
    pub fn note(&mut self, text: &str) -> RenderUpdate {
        let target = if self.in_turn {
            &mut self.held
        } else {
            &mut self.buffer
        };
        separate(target);
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            target.push('_');
            target.push_str(line.trim());
            target.push_str("_\n");
        }
        self.refresh()
    }

    fn fold_held(&mut self) {
        if self.held.is_empty() {
            return;
        }
        separate(&mut self.buffer);
        let held = std::mem::take(&mut self.held);
        self.buffer.push_str(&held);
    }
}

/// Make sure new content starts after a blank line.
fn separate(buffer: &mut String) {
    if buffer.is_empty() {
        return;
    }
    if !buffer.ends_with('\n') {
        buffer.push('\n');
    }
    if !buffer.ends_with("\n\n") {
        buffer.push('\n');
    }
}

impl Default for IncrementalRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH)
    }
}

impl std::fmt::Debug for IncrementalRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalRenderer")
            .field("buffer", &self.buffer)
            .field("held", &self.held)
            .field("in_turn", &self.in_turn)
            .field("width", &self.width)
            .finish()
    }
}
