use crate::api::MAX_QUESTION_CHARS;
use crate::controller::DraftStatus;
use crate::ui::conversation::commands::{command_entries, parse_slash_command, CommandEntry, ParsedCommand};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        block::{Position, Title},
        Block, Borders, Clear, Widget,
    },
};

/// Result returned when the user interacts with the composer
#[derive(Debug, PartialEq)]
pub enum ComposerResult {
    /// Enter on a non-blank draft; the text stays in the composer
    Submitted(String),
    Command(ParsedCommand),
    /// The draft text changed
    Edited,
    None,
}

/// State for the text area within the composer
#[derive(Debug, Clone, Default)]
pub struct TextAreaState {
    pub content: String,
    /// Cursor position in characters, not bytes
    pub cursor_position: usize,
}

impl TextAreaState {
    fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    fn byte_index(&self, char_index: usize) -> usize {
        self.content
            .char_indices()
            .nth(char_index)
            .map(|(index, _)| index)
            .unwrap_or(self.content.len())
    }

    fn insert_char(&mut self, c: char) {
        let index = self.byte_index(self.cursor_position);
        self.content.insert(index, c);
        self.cursor_position += 1;
    }

    /// Delete character before cursor
    fn backspace(&mut self) -> bool {
        if self.cursor_position == 0 {
            return false;
        }
        self.cursor_position -= 1;
        let index = self.byte_index(self.cursor_position);
        self.content.remove(index);
        true
    }

    /// Delete character at cursor
    fn delete(&mut self) -> bool {
        if self.cursor_position >= self.char_len() {
            return false;
        }
        let index = self.byte_index(self.cursor_position);
        self.content.remove(index);
        true
    }
}

/// Question composer with a slash-command palette
#[derive(Debug, Clone)]
pub struct ConversationComposer {
    state: TextAreaState,
    placeholder: String,
    sending: bool,
    command_entries: Vec<CommandEntry>,
    filtered_commands: Vec<CommandEntry>,
    show_command_palette: bool,
    selected_command: Option<usize>,
}

impl ConversationComposer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            state: TextAreaState::default(),
            placeholder: placeholder.into(),
            sending: false,
            command_entries: command_entries(),
            filtered_commands: Vec::new(),
            show_command_palette: false,
            selected_command: None,
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ComposerResult {
        if key.kind != KeyEventKind::Press {
            return ComposerResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    self.state.insert_char('\n');
                    return ComposerResult::Edited;
                }
                if self.show_command_palette && self.apply_selected_command() {
                    return ComposerResult::Edited;
                }
                if self.state.content.trim().is_empty() {
                    return ComposerResult::None;
                }
                if let Some(command) = parse_slash_command(&self.state.content) {
                    self.clear();
                    return ComposerResult::Command(command);
                }
                ComposerResult::Submitted(self.state.content.clone())
            }
            KeyCode::Up if self.show_command_palette => {
                self.move_command_selection(-1);
                ComposerResult::None
            }
            KeyCode::Down if self.show_command_palette => {
                self.move_command_selection(1);
                ComposerResult::None
            }
            KeyCode::Esc if self.show_command_palette => {
                self.close_command_palette();
                ComposerResult::None
            }
            KeyCode::Tab if self.show_command_palette => {
                if self.apply_selected_command() {
                    ComposerResult::Edited
                } else {
                    ComposerResult::None
                }
            }
            KeyCode::Char(c) => {
                if key.modifiers.contains(KeyModifiers::CONTROL) {
                    return ComposerResult::None;
                }

                self.state.insert_char(c);

                if self.state.content == "/" {
                    self.open_command_palette();
                } else if self.show_command_palette {
                    if self.state.content.starts_with('/') && !c.is_whitespace() {
                        self.refresh_command_palette();
                    } else {
                        self.close_command_palette();
                    }
                }
                ComposerResult::Edited
            }
            KeyCode::Backspace => {
                if !self.state.backspace() {
                    return ComposerResult::None;
                }
                self.sync_palette();
                ComposerResult::Edited
            }
            KeyCode::Delete => {
                if !self.state.delete() {
                    return ComposerResult::None;
                }
                self.sync_palette();
                ComposerResult::Edited
            }
            KeyCode::Left => {
                self.state.cursor_position = self.state.cursor_position.saturating_sub(1);
                ComposerResult::None
            }
            KeyCode::Right => {
                if self.state.cursor_position < self.state.char_len() {
                    self.state.cursor_position += 1;
                }
                ComposerResult::None
            }
            KeyCode::Home => {
                self.state.cursor_position = 0;
                ComposerResult::None
            }
            KeyCode::End => {
                self.state.cursor_position = self.state.char_len();
                ComposerResult::None
            }
            _ => ComposerResult::None,
        }
    }

    fn sync_palette(&mut self) {
        if !self.show_command_palette {
            return;
        }
        if self.state.content.starts_with('/') {
            self.refresh_command_palette();
        } else {
            self.close_command_palette();
        }
    }

    fn open_command_palette(&mut self) {
        self.show_command_palette = true;
        self.selected_command = Some(0);
        self.refresh_command_palette();
    }

    fn close_command_palette(&mut self) {
        self.show_command_palette = false;
        self.filtered_commands.clear();
        self.selected_command = None;
    }

    fn refresh_command_palette(&mut self) {
        let query = self.state.content.trim_start_matches('/').to_lowercase();
        self.filtered_commands = self
            .command_entries
            .iter()
            .filter(|entry| query.is_empty() || entry.keyword.starts_with(&query))
            .copied()
            .collect();

        self.selected_command = if self.filtered_commands.is_empty() {
            None
        } else {
            let index = self.selected_command.unwrap_or(0);
            Some(index.min(self.filtered_commands.len() - 1))
        };
    }

    fn move_command_selection(&mut self, delta: isize) {
        if self.filtered_commands.is_empty() {
            self.selected_command = None;
            return;
        }

        let len = self.filtered_commands.len() as isize;
        let current = self.selected_command.unwrap_or(0) as isize;
        self.selected_command = Some((current + delta).rem_euclid(len) as usize);
    }

    fn apply_selected_command(&mut self) -> bool {
        let Some(entry) = self
            .selected_command
            .and_then(|index| self.filtered_commands.get(index).copied())
        else {
            return false;
        };

        self.state.content = format!("/{}", entry.keyword);
        self.state.cursor_position = self.state.char_len();
        self.close_command_palette();
        true
    }

    pub fn palette_open(&self) -> bool {
        self.show_command_palette
    }

    /// Mark whether a question is in flight (changes the title)
    pub fn set_sending(&mut self, sending: bool) {
        self.sending = sending;
    }

    /// Get current content
    pub fn content(&self) -> &str {
        &self.state.content
    }

    /// Clear content
    pub fn clear(&mut self) {
        self.state = TextAreaState::default();
        self.close_command_palette();
    }

    fn title(&self) -> (String, Style) {
        if self.sending {
            return ("Sending...".to_string(), Style::default().fg(Color::Yellow));
        }
        match DraftStatus::of(&self.state.content) {
            DraftStatus::Ready => ("Your Question (Enter to send)".to_string(), Style::default().fg(Color::Green)),
            DraftStatus::Empty => ("Your Question".to_string(), Style::default().fg(Color::Gray)),
            DraftStatus::TooLong { len } => (
                format!("Too long by {} characters", len - MAX_QUESTION_CHARS),
                Style::default().fg(Color::Red),
            ),
        }
    }

    /// First draft line shown in a box `height` lines tall, keeping the
    /// cursor's line in view
    fn first_visible_line(&self, height: usize) -> usize {
        let before_cursor = &self.state.content[..self.state.byte_index(self.state.cursor_position)];
        let cursor_line = before_cursor.matches('\n').count();
        cursor_line.saturating_sub(height.saturating_sub(1))
    }

    /// Draft text (or the placeholder) inside the borders
    fn render_text(&self, inner_area: Rect, buf: &mut Buffer) {
        if inner_area.is_empty() {
            return;
        }

        if self.state.content.is_empty() {
            let placeholder_line = Line::from(vec![Span::styled(
                self.placeholder.as_str(),
                Style::default().fg(Color::DarkGray),
            )]);
            buf.set_line(inner_area.x, inner_area.y, &placeholder_line, inner_area.width);
            return;
        }

        let mut content = self.state.content.clone();
        content.insert(self.state.byte_index(self.state.cursor_position), '▌');

        let height = inner_area.height as usize;
        let start = self.first_visible_line(height);
        for (i, line_text) in content.split('\n').skip(start).take(height).enumerate() {
            let line = Line::from(vec![Span::raw(line_text)]);
            buf.set_line(inner_area.x, inner_area.y + i as u16, &line, inner_area.width);
        }
    }

    fn counter(&self) -> Line<'static> {
        let len = self.state.char_len();
        let style = if len > MAX_QUESTION_CHARS {
            Style::default().fg(Color::Red)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        Line::from(Span::styled(format!("{len}/{MAX_QUESTION_CHARS} characters"), style))
    }
}

impl Widget for &ConversationComposer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let (title, title_style) = self.title();
        let block = Block::default()
            .borders(Borders::ALL)
            .title(Title::from(Span::styled(title, title_style)))
            .title(
                Title::from(self.counter())
                    .position(Position::Bottom)
                    .alignment(Alignment::Right),
            )
            .border_style(if self.sending {
                Style::default().fg(Color::Gray)
            } else {
                Style::default().fg(Color::Green)
            });

        let inner_area = block.inner(area);
        block.render(area, buf);

        self.render_text(inner_area, buf);

        if self.show_command_palette && !self.filtered_commands.is_empty() {
            let palette_height = (self.filtered_commands.len().min(6) + 2) as u16;
            let palette_area = Rect {
                x: area.x,
                y: area.y.saturating_sub(palette_height),
                width: area.width,
                height: palette_height.min(area.y),
            };
            if palette_area.height < 3 {
                return;
            }

            Clear.render(palette_area, buf);
            let block = Block::default()
                .borders(Borders::ALL)
                .title("Commands")
                .border_style(Style::default().fg(Color::Blue));
            let inner = block.inner(palette_area);
            block.render(palette_area, buf);

            for (index, entry) in self.filtered_commands.iter().enumerate() {
                if index >= inner.height as usize {
                    break;
                }

                let style = if self.selected_command == Some(index) {
                    Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::White)
                };

                let line = Line::from(vec![
                    Span::styled(format!("/{}", entry.keyword), style),
                    Span::styled(" - ", Style::default().fg(Color::DarkGray)),
                    Span::styled(entry.description, Style::default().fg(Color::Gray)),
                ]);
                buf.set_line(inner.x, inner.y + index as u16, &line, inner.width);
            }
        }
    }
}
