//! Exchange list: the history panel and the chat transcript

use crate::api::Exchange;
use crate::ui::conversation::{format_timestamp, wrap_text};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};
use std::cell::Cell;

pub const EMPTY_HISTORY_MESSAGE: &str = "No conversation history yet. Ask your first question!";

/// How exchanges are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStyle {
    /// Question/response cards, newest at the top
    Cards,
    /// Chat bubbles, newest at the bottom
    Bubbles,
}

/// Renders a slice of exchanges in display order
pub struct ExchangeList<'a> {
    exchanges: Vec<&'a Exchange>,
    style: ListStyle,
    title: String,
    pending_question: Option<&'a str>,
    loading: bool,
    scroll: usize,
    max_scroll: Option<&'a Cell<usize>>,
}

impl<'a> ExchangeList<'a> {
    pub fn new(exchanges: impl IntoIterator<Item = &'a Exchange>, style: ListStyle) -> Self {
        Self {
            exchanges: exchanges.into_iter().collect(),
            style,
            title: "💬 Conversation History".to_string(),
            pending_question: None,
            loading: false,
            scroll: 0,
            max_scroll: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Question shown as an unanswered bubble at the end of the transcript
    pub fn pending(mut self, question: Option<&'a str>) -> Self {
        self.pending_question = question;
        self
    }

    pub fn loading(mut self, loading: bool) -> Self {
        self.loading = loading;
        self
    }

    /// Lines scrolled away from the anchor; the largest usable value is
    /// written back to `max_scroll` on render
    pub fn scroll(mut self, scroll: usize, max_scroll: &'a Cell<usize>) -> Self {
        self.scroll = scroll;
        self.max_scroll = Some(max_scroll);
        self
    }

    /// Every line of the list, before scrolling
    pub fn lines(&self, width: u16) -> Vec<Line<'a>> {
        let mut lines = Vec::new();
        for exchange in &self.exchanges {
            match self.style {
                ListStyle::Cards => self.card_lines(exchange, width, &mut lines),
                ListStyle::Bubbles => self.bubble_lines(exchange, width, &mut lines),
            }
            lines.push(Line::from(""));
        }

        if let Some(question) = self.pending_question {
            if self.style == ListStyle::Bubbles {
                push_bubble(&mut lines, question, width, Side::Right, Color::Blue);
                lines.push(Line::from(Span::styled(
                    "  🤖 thinking...",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
                )));
            }
        }

        while lines.last().is_some_and(|line| line.width() == 0) {
            lines.pop();
        }
        lines
    }

    fn card_lines(&self, exchange: &Exchange, width: u16, lines: &mut Vec<Line<'a>>) {
        let content_width = width.saturating_sub(2) as usize;
        let label = Style::default().fg(Color::White).add_modifier(Modifier::BOLD);
        let stamp = format_timestamp(&exchange.timestamp);

        let gap = (width as usize).saturating_sub("Question:".len() + stamp.len());
        lines.push(Line::from(vec![
            Span::styled("Question:", label),
            Span::raw(" ".repeat(gap)),
            Span::styled(stamp, Style::default().fg(Color::DarkGray)),
        ]));
        for text in wrap_text(&exchange.question, content_width) {
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(text, Style::default().fg(Color::Gray)),
            ]));
        }

        lines.push(Line::from(Span::styled("Response:", label)));
        for text in wrap_text(&exchange.response, content_width) {
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(text, Style::default().fg(Color::Cyan)),
            ]));
        }

        lines.push(Line::from(Span::styled(
            "─".repeat(width as usize),
            Style::default().fg(Color::DarkGray),
        )));
    }

    fn bubble_lines(&self, exchange: &Exchange, width: u16, lines: &mut Vec<Line<'a>>) {
        let stamp = exchange.timestamp.with_timezone(&chrono::Local).format("%H:%M").to_string();
        push_bubble(lines, &exchange.question, width, Side::Right, Color::Blue);
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("🤖 {stamp}"),
            Style::default().fg(Color::DarkGray),
        )));
        push_bubble(lines, &exchange.response, width, Side::Left, Color::Green);
    }
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// Push a bordered bubble three quarters of the width wide
fn push_bubble(lines: &mut Vec<Line<'_>>, text: &str, width: u16, side: Side, color: Color) {
    let width = width as usize;
    let bubble_width = (width * 3 / 4).max(8).min(width);
    let wrapped = wrap_text(text, bubble_width.saturating_sub(4));
    let inner = wrapped
        .iter()
        .map(|line| line.chars().count())
        .max()
        .unwrap_or(0);
    let indent = match side {
        Side::Left => 0,
        Side::Right => width.saturating_sub(inner + 4),
    };
    let pad = " ".repeat(indent);
    let border = Style::default().fg(color);

    lines.push(Line::from(vec![
        Span::raw(pad.clone()),
        Span::styled(format!("╭{}╮", "─".repeat(inner + 2)), border),
    ]));
    for text in wrapped {
        let fill = inner - text.chars().count();
        lines.push(Line::from(vec![
            Span::raw(pad.clone()),
            Span::styled("│ ", border),
            Span::styled(format!("{text}{}", " ".repeat(fill)), Style::default().fg(color)),
            Span::styled(" │", border),
        ]));
    }
    lines.push(Line::from(vec![
        Span::raw(pad),
        Span::styled(format!("╰{}╯", "─".repeat(inner + 2)), border),
    ]));
}

impl Widget for ExchangeList<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let title = if self.loading && self.style == ListStyle::Bubbles {
            format!("{} (loading...)", self.title)
        } else {
            self.title.clone()
        };
        let block = Block::default().borders(Borders::ALL).title(title);
        let inner_area = block.inner(area);
        block.render(area, buf);

        let notice = if self.loading && self.style == ListStyle::Cards {
            Some(("⏳ Loading history...", Color::Yellow))
        } else if self.exchanges.is_empty() && self.pending_question.is_none() {
            Some((EMPTY_HISTORY_MESSAGE, Color::Gray))
        } else {
            None
        };

        if let Some((text, color)) = notice {
            let line = Line::from(Span::styled(text, Style::default().fg(color)));
            let x = inner_area.x + inner_area.width.saturating_sub(line.width() as u16) / 2;
            let y = inner_area.y + inner_area.height / 2;
            if inner_area.height > 0 {
                buf.set_line(x, y, &line, inner_area.width);
            }
            return;
        }

        let lines = self.lines(inner_area.width);
        let height = inner_area.height as usize;
        let max_scroll = lines.len().saturating_sub(height);
        if let Some(cell) = self.max_scroll {
            cell.set(max_scroll);
        }
        let scroll = self.scroll.min(max_scroll);

        let start = match self.style {
            ListStyle::Cards => scroll,
            ListStyle::Bubbles => max_scroll - scroll,
        };

        for (i, line) in lines.iter().skip(start).take(height).enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }
    }
}
