use crate::api::ChatApi;
use crate::controller::{ChatController, Command, Outcome};
use crate::events::{Layout as ChatLayout, ViewMode};
use crate::ui::conversation::{
    get_help_text, ComposerResult, ConversationComposer, ExchangeList, ListStyle, ParsedCommand,
    ResponsePanel, SlashCommand,
};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};
use std::cell::Cell;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

const SCROLL_STEP: usize = 5;

/// Actions that can be requested by the conversation manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationAction {
    None,
    Exit,
}

/// Runs commands on background tasks and reports outcomes on a channel
#[derive(Clone)]
pub struct CommandDispatcher {
    api: Arc<dyn ChatApi>,
    outcomes: mpsc::UnboundedSender<Outcome>,
}

impl CommandDispatcher {
    pub fn new(api: Arc<dyn ChatApi>) -> (Self, mpsc::UnboundedReceiver<Outcome>) {
        let (outcomes, rx) = mpsc::unbounded_channel();
        (Self { api, outcomes }, rx)
    }

    pub fn dispatch(&self, command: Command) {
        debug!(?command, "dispatching");
        let api = Arc::clone(&self.api);
        let outcomes = self.outcomes.clone();
        tokio::spawn(async move {
            let outcome = command.run(api.as_ref()).await;
            // The UI may already be gone; nothing left to update then.
            let _ = outcomes.send(outcome);
        });
    }
}

/// Ties the controller to the composer and the views
pub struct ConversationManager {
    controller: ChatController,
    composer: ConversationComposer,
    dispatcher: CommandDispatcher,
    notice: Option<String>,
    scroll: usize,
    max_scroll: Cell<usize>,
}

impl ConversationManager {
    pub fn new(controller: ChatController, dispatcher: CommandDispatcher) -> Self {
        Self {
            controller,
            composer: ConversationComposer::new("Ask something..."),
            dispatcher,
            notice: None,
            scroll: 0,
            max_scroll: Cell::new(0),
        }
    }

    /// Issue the layout's startup requests
    pub fn start(&mut self) {
        for command in self.controller.initial_commands() {
            self.dispatcher.dispatch(command);
        }
    }

    pub fn controller(&self) -> &ChatController {
        &self.controller
    }

    fn dispatch(&self, command: Option<Command>) {
        if let Some(command) = command {
            self.dispatcher.dispatch(command);
        }
    }

    /// Fold a finished request into the state
    pub fn apply(&mut self, outcome: Outcome) {
        let was_loading = self.controller.state().is_loading_history;
        let follow_up = self.controller.apply(outcome);
        self.dispatch(follow_up);

        if was_loading && !self.controller.state().is_loading_history {
            self.scroll = 0;
        }
        if self.controller.draft().is_empty() && !self.composer.content().is_empty() {
            self.composer.clear();
        }
        self.composer.set_sending(self.controller.state().is_sending);
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationAction {
        if key.kind != KeyEventKind::Press {
            return ConversationAction::None;
        }
        self.notice = None;

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') | KeyCode::Char('d') => return ConversationAction::Exit,
                KeyCode::Char('r') => {
                    let command = self.controller.refresh();
                    self.dispatch(command);
                    return ConversationAction::None;
                }
                _ => {}
            }
        }

        if !self.composer.palette_open() {
            match key.code {
                KeyCode::Tab => {
                    let command = self.controller.toggle_view();
                    self.dispatch(command);
                    return ConversationAction::None;
                }
                KeyCode::Esc if self.controller.last_error().is_some() => {
                    self.controller.clear_error();
                    return ConversationAction::None;
                }
                KeyCode::PageUp => {
                    self.scroll_older();
                    return ConversationAction::None;
                }
                KeyCode::PageDown => {
                    self.scroll_newer();
                    return ConversationAction::None;
                }
                _ => {}
            }
        }

        match self.composer.handle_key(key) {
            ComposerResult::Submitted(text) => {
                self.controller.set_draft(text);
                let command = self.controller.submit();
                self.composer.set_sending(self.controller.state().is_sending);
                self.dispatch(command);
                ConversationAction::None
            }
            ComposerResult::Command(command) => self.handle_slash_command(command),
            ComposerResult::Edited => {
                self.controller.set_draft(self.composer.content());
                ConversationAction::None
            }
            ComposerResult::None => ConversationAction::None,
        }
    }

    /// Handle slash commands
    fn handle_slash_command(&mut self, command: ParsedCommand) -> ConversationAction {
        // The composer cleared itself; keep the draft in step
        self.controller.set_draft("");

        match command.command {
            SlashCommand::Ask => self.controller.show_ask(),
            SlashCommand::History => {
                if self.controller.layout() == ChatLayout::Single
                    && self.controller.view_mode() == ViewMode::Ask
                {
                    let command = self.controller.toggle_view();
                    self.dispatch(command);
                } else {
                    let command = self.controller.refresh();
                    self.dispatch(command);
                }
            }
            SlashCommand::Refresh => {
                let command = self.controller.refresh();
                self.dispatch(command);
            }
            SlashCommand::Layout => {
                let target = command.layout_target().unwrap_or(match self.controller.layout() {
                    ChatLayout::Single => ChatLayout::Transcript,
                    ChatLayout::Transcript => ChatLayout::Single,
                });
                let command = self.controller.set_layout(target);
                self.scroll = 0;
                self.dispatch(command);
            }
            SlashCommand::Help => {
                self.notice = Some(get_help_text());
            }
            SlashCommand::Quit => return ConversationAction::Exit,
        }

        ConversationAction::None
    }

    fn list_style(&self) -> ListStyle {
        match self.controller.layout() {
            ChatLayout::Single => ListStyle::Cards,
            ChatLayout::Transcript => ListStyle::Bubbles,
        }
    }

    fn scroll_older(&mut self) {
        self.scroll = match self.list_style() {
            ListStyle::Bubbles => (self.scroll + SCROLL_STEP).min(self.max_scroll.get()),
            ListStyle::Cards => self.scroll.saturating_sub(SCROLL_STEP),
        };
    }

    fn scroll_newer(&mut self) {
        self.scroll = match self.list_style() {
            ListStyle::Bubbles => self.scroll.saturating_sub(SCROLL_STEP),
            ListStyle::Cards => (self.scroll + SCROLL_STEP).min(self.max_scroll.get()),
        };
    }

    fn header_lines(&self) -> Vec<Line<'static>> {
        let mut lines = vec![
            Line::from(Span::styled(
                "🧪 Crewmind Assistant",
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                "Ask me anything and I'll help you out!",
                Style::default().fg(Color::Gray),
            )),
        ];

        let state = self.controller.state();
        let tabs = match self.controller.layout() {
            ChatLayout::Single => {
                let active = Style::default().fg(Color::Black).bg(Color::Blue).add_modifier(Modifier::BOLD);
                let inactive = Style::default().fg(Color::Gray);
                let (ask, history) = match state.view_mode {
                    ViewMode::Ask => (active, inactive),
                    ViewMode::History => (inactive, active),
                };
                Line::from(vec![
                    Span::styled(format!(" {} ", ViewMode::Ask.display_name()), ask),
                    Span::raw("  "),
                    Span::styled(
                        format!(" {} ({}) ", ViewMode::History.display_name(), state.exchanges.len()),
                        history,
                    ),
                ])
            }
            ChatLayout::Transcript => Line::from(Span::styled(
                format!(
                    "{} · {} of {} exchanges",
                    ChatLayout::Transcript.display_name(),
                    state.exchanges.len(),
                    self.controller.total_count()
                ),
                Style::default().fg(Color::DarkGray),
            )),
        };
        lines.push(tabs);
        lines
    }

    fn status_line(&self) -> Line<'static> {
        let state = self.controller.state();
        let show_error = self.controller.layout() == ChatLayout::Transcript
            || state.view_mode == ViewMode::History;

        match state.last_error.as_deref() {
            Some(error) if show_error => Line::from(Span::styled(
                format!("❌ {error} (Esc to dismiss)"),
                Style::default().fg(Color::Red),
            )),
            _ => Line::from(Span::styled(
                "Tab: toggle history · Ctrl+R: refresh · PgUp/PgDn: scroll · /help · Ctrl+C: quit",
                Style::default().fg(Color::DarkGray),
            )),
        }
    }
}

impl Widget for &ConversationManager {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(6),    // Body
                Constraint::Length(1), // Status
                Constraint::Length(5), // Composer
            ])
            .split(area);

        // Rows that do not fit come back as zero-height chunks below the buffer
        if !chunks[0].is_empty() {
            Paragraph::new(self.header_lines())
                .alignment(Alignment::Center)
                .render(chunks[0], buf);
        }

        let state = self.controller.state();
        if !chunks[1].is_empty() {
            match (self.controller.layout(), state.view_mode) {
                (ChatLayout::Single, ViewMode::Ask) => {
                    ResponsePanel::new(
                        self.controller.latest_response(),
                        self.controller.last_error(),
                        state.is_sending,
                    )
                    .render(chunks[1], buf);
                }
                (ChatLayout::Single, ViewMode::History) => {
                    ExchangeList::new(self.controller.exchanges(), ListStyle::Cards)
                        .title("Conversation History (Ctrl+R to refresh)")
                        .loading(state.is_loading_history)
                        .scroll(self.scroll, &self.max_scroll)
                        .render(chunks[1], buf);
                }
                (ChatLayout::Transcript, _) => {
                    ExchangeList::new(self.controller.transcript(), ListStyle::Bubbles)
                        .pending(self.controller.pending_question())
                        .loading(state.is_loading_history)
                        .scroll(self.scroll, &self.max_scroll)
                        .render(chunks[1], buf);
                }
            }
        }

        if !chunks[2].is_empty() {
            buf.set_line(chunks[2].x, chunks[2].y, &self.status_line(), chunks[2].width);
        }
        if !chunks[3].is_empty() {
            self.composer.render(chunks[3], buf);
        }

        if let Some(notice) = self.notice.as_ref().filter(|_| chunks[1].height >= 3) {
            let body = chunks[1];
            let height = (notice.lines().count() as u16 + 2).min(body.height);
            let popup = Rect {
                x: body.x + 2,
                y: body.y,
                width: body.width.saturating_sub(4),
                height,
            };
            Clear.render(popup, buf);
            Paragraph::new(notice.as_str())
                .wrap(Wrap { trim: false })
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title("Help")
                        .border_style(Style::default().fg(Color::Yellow)),
                )
                .render(popup, buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AskResponse, Exchange, HistoryPage};
    use crate::error::ApiError;
    use async_trait::async_trait;

    /// Answers every question with its length and returns an empty history
    struct EchoApi;

    #[async_trait]
    impl ChatApi for EchoApi {
        async fn ask(&self, question: &str) -> Result<AskResponse, ApiError> {
            Ok(AskResponse {
                response: question.len().to_string(),
                timestamp: None,
            })
        }

        async fn history(&self, page: u32, per_page: u32) -> Result<HistoryPage, ApiError> {
            Ok(HistoryPage {
                questions: Vec::new(),
                total_count: 0,
                page,
                per_page,
                total_pages: Some(0),
            })
        }

        async fn question(&self, _id: &str) -> Result<Exchange, ApiError> {
            Err(ApiError::Status {
                status: reqwest::StatusCode::NOT_FOUND,
                detail: None,
            })
        }
    }

    fn manager(layout: ChatLayout) -> (ConversationManager, mpsc::UnboundedReceiver<Outcome>) {
        let api: Arc<dyn ChatApi> = Arc::new(EchoApi);
        let (dispatcher, rx) = CommandDispatcher::new(Arc::clone(&api));
        (ConversationManager::new(ChatController::new(api, layout), dispatcher), rx)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(manager: &mut ConversationManager, text: &str) {
        for c in text.chars() {
            manager.handle_key(key(KeyCode::Char(c)));
        }
    }

    #[tokio::test]
    async fn enter_sends_and_outcome_clears_composer() {
        let (mut manager, mut rx) = manager(ChatLayout::Single);
        type_text(&mut manager, "What is 2+2?");
        assert_eq!(manager.controller().draft(), "What is 2+2?");

        manager.handle_key(key(KeyCode::Enter));
        assert!(manager.controller().state().is_sending);
        assert_eq!(manager.controller().pending_question(), Some("What is 2+2?"));

        let outcome = rx.recv().await.unwrap();
        manager.apply(outcome);
        assert_eq!(manager.controller().latest_response(), Some("12"));
        assert_eq!(manager.composer.content(), "");

        // follow-up history refresh
        let outcome = rx.recv().await.unwrap();
        assert!(matches!(outcome, Outcome::HistoryLoaded { result: Ok(_), .. }));
        manager.apply(outcome);
        assert!(!manager.controller().state().is_loading_history);
    }

    #[tokio::test]
    async fn tab_enters_history_and_loads() {
        let (mut manager, mut rx) = manager(ChatLayout::Single);

        manager.handle_key(key(KeyCode::Tab));
        assert_eq!(manager.controller().view_mode(), ViewMode::History);
        assert!(manager.controller().state().is_loading_history);

        manager.apply(rx.recv().await.unwrap());
        assert!(manager.controller().exchanges().is_empty());

        let area = Rect::new(0, 0, 80, 24);
        let mut buf = Buffer::empty(area);
        (&manager).render(area, &mut buf);
    }

    #[tokio::test]
    async fn slash_commands_switch_layout_and_quit() {
        let (mut manager, _rx) = manager(ChatLayout::Single);

        type_text(&mut manager, "/layout transcript");
        manager.handle_key(key(KeyCode::Esc));
        manager.handle_key(key(KeyCode::Enter));
        assert_eq!(manager.controller().layout(), ChatLayout::Transcript);
        assert_eq!(manager.controller().draft(), "");

        type_text(&mut manager, "/quit");
        manager.handle_key(key(KeyCode::Esc));
        assert_eq!(manager.handle_key(key(KeyCode::Enter)), ConversationAction::Exit);
    }

    #[tokio::test]
    async fn help_notice_renders_and_clears_on_next_key() {
        let (mut manager, _rx) = manager(ChatLayout::Transcript);
        type_text(&mut manager, "/help");
        manager.handle_key(key(KeyCode::Esc));
        manager.handle_key(key(KeyCode::Enter));
        assert!(manager.notice.is_some());

        let area = Rect::new(0, 0, 80, 30);
        let mut buf = Buffer::empty(area);
        (&manager).render(area, &mut buf);

        manager.handle_key(key(KeyCode::Char('x')));
        assert!(manager.notice.is_none());
    }

    fn failure() -> Outcome {
        Outcome::Submitted(Err(ApiError::Status {
            status: reqwest::StatusCode::BAD_GATEWAY,
            detail: None,
        }))
    }

    #[test]
    fn renders_in_any_terminal_height() {
        for layout in [ChatLayout::Single, ChatLayout::Transcript] {
            for history in [false, true] {
                let (mut busy, _rx) = manager(layout);
                if history {
                    let _ = busy.controller.toggle_view();
                }
                busy.apply(failure());
                type_text(&mut busy, "line one");
                busy.notice = Some(get_help_text());

                for height in 1..=15 {
                    let area = Rect::new(0, 0, 80, height);
                    let mut buf = Buffer::empty(area);
                    (&busy).render(area, &mut buf);
                }

                let (empty, _rx) = manager(layout);
                for height in 0..=15 {
                    let area = Rect::new(0, 0, 40, height);
                    let mut buf = Buffer::empty(area);
                    (&empty).render(area, &mut buf);
                }
            }
        }
    }

    #[test]
    fn esc_dismisses_the_error() {
        let (mut manager, _rx) = manager(ChatLayout::Transcript);
        manager.apply(failure());
        assert!(manager.controller().last_error().is_some());

        manager.handle_key(key(KeyCode::Esc));
        assert_eq!(manager.controller().last_error(), None);
    }

    #[test]
    fn ctrl_c_exits() {
        let (mut manager, _rx) = manager(ChatLayout::Transcript);
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(manager.handle_key(ctrl_c), ConversationAction::Exit);
    }
}
