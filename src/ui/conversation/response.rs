use crate::ui::conversation::wrap_text;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Single-response panel: sending indicator, error box and latest answer
#[derive(Debug, Clone, Default)]
pub struct ResponsePanel<'a> {
    response: Option<&'a str>,
    error: Option<&'a str>,
    sending: bool,
}

impl<'a> ResponsePanel<'a> {
    pub fn new(response: Option<&'a str>, error: Option<&'a str>, sending: bool) -> Self {
        Self {
            response,
            error,
            sending,
        }
    }

    fn lines(&self, width: u16) -> Vec<Line<'static>> {
        let content_width = width.saturating_sub(2) as usize;
        let mut lines = Vec::new();

        if self.sending {
            lines.push(Line::from(vec![
                Span::styled("🤖 ", Style::default().fg(Color::Green)),
                Span::styled("Sending", Style::default().fg(Color::Green)),
                Span::styled(animated_dots(), Style::default().fg(Color::Yellow)),
            ]));
            lines.push(Line::from(""));
        }

        if let Some(error) = self.error {
            lines.push(Line::from(Span::styled(
                "❌ Error",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )));
            for text in wrap_text(error, content_width) {
                lines.push(Line::from(vec![
                    Span::raw("  "),
                    Span::styled(text, Style::default().fg(Color::Red)),
                ]));
            }
            lines.push(Line::from(""));
        }

        if let Some(response) = self.response {
            lines.push(Line::from(Span::styled(
                "Response:",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            )));
            for text in wrap_text(response, content_width) {
                lines.push(Line::from(vec![
                    Span::raw("  "),
                    Span::styled(text, Style::default().fg(Color::Green)),
                ]));
            }
        }

        lines
    }
}

fn animated_dots() -> &'static str {
    let phase = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        / 300;
    match phase % 4 {
        0 => ".",
        1 => "..",
        2 => "...",
        _ => "   ",
    }
}

impl Widget for ResponsePanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default().borders(Borders::ALL).title("Ask Question");
        let inner_area = block.inner(area);
        block.render(area, buf);

        let mut lines = self.lines(inner_area.width);
        if lines.is_empty() {
            lines.push(Line::from(Span::styled(
                "Ask me anything and I'll help you out!",
                Style::default().fg(Color::Gray),
            )));
        }

        let footer = Line::from(Span::styled(
            "Press Enter to send • Shift+Enter for new line",
            Style::default().fg(Color::DarkGray),
        ));

        let height = inner_area.height as usize;
        for (i, line) in lines.iter().take(height.saturating_sub(1)).enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }
        if height > 0 {
            let x = inner_area.x + inner_area.width.saturating_sub(footer.width() as u16) / 2;
            buf.set_line(x, inner_area.y + inner_area.height - 1, &footer, inner_area.width);
        }
    }
}
