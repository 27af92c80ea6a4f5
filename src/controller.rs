//! Chat client controller: owns the UI state and the two remote operations.
//!
//! State only changes through the methods below. Requests that need the
//! network are returned as [`Command`]s; running one against a [`ChatApi`]
//! yields an [`Outcome`], which [`ChatController::apply`] folds back into the
//! state. The TUI runs commands on background tasks; the CLI and tests await
//! them in place through [`ChatController::submit_question`] and
//! [`ChatController::load_history`].

use crate::api::{AskResponse, ChatApi, Exchange, HistoryPage, MAX_QUESTION_CHARS};
use crate::config::MAX_PAGE_SIZE;
use crate::error::{ApiError, ClientError};
use crate::events::{Layout, ViewMode};
use std::sync::Arc;
use tracing::{debug, error};

/// Whether the current draft may be sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftStatus {
    /// Nothing but whitespace
    Empty,
    /// Longer than [`MAX_QUESTION_CHARS`]
    TooLong { len: usize },
    Ready,
}

impl DraftStatus {
    pub fn of(text: &str) -> Self {
        let len = text.chars().count();
        if text.trim().is_empty() {
            DraftStatus::Empty
        } else if len > MAX_QUESTION_CHARS {
            DraftStatus::TooLong { len }
        } else {
            DraftStatus::Ready
        }
    }
}

/// A network request the controller wants performed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit { question: String },
    /// `seq` identifies the load; only the most recently issued one is applied
    LoadHistory { page: u32, per_page: u32, seq: u64 },
}

impl Command {
    /// Perform the request; never touches controller state
    pub async fn run(self, api: &dyn ChatApi) -> Outcome {
        match self {
            Command::Submit { question } => Outcome::Submitted(api.ask(&question).await),
            Command::LoadHistory { page, per_page, seq } => Outcome::HistoryLoaded {
                seq,
                result: api.history(page, per_page).await,
            },
        }
    }
}

/// Result of a [`Command`], applied with [`ChatController::apply`]
#[derive(Debug)]
pub enum Outcome {
    Submitted(Result<AskResponse, ApiError>),
    HistoryLoaded {
        seq: u64,
        result: Result<HistoryPage, ApiError>,
    },
}

/// Where the loaded exchanges sit in the full history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl PageInfo {
    fn of(page: &HistoryPage, total_count: u64) -> Self {
        let per_page = page.per_page.max(1);
        let total_pages = page.total_pages.unwrap_or_else(|| {
            u32::try_from(total_count.div_ceil(u64::from(per_page))).unwrap_or(u32::MAX)
        });
        Self {
            page: page.page,
            per_page,
            total_pages: total_pages.max(1),
        }
    }
}

/// Everything the views render from
#[derive(Debug, Clone, Default)]
pub struct ClientState {
    pub draft: String,
    pub is_sending: bool,
    pub is_loading_history: bool,
    pub last_error: Option<String>,
    /// Server order: newest first
    pub exchanges: Vec<Exchange>,
    pub total_count: u64,
    /// Paging of the last applied history load
    pub page: Option<PageInfo>,
    pub latest_response: Option<String>,
    pub view_mode: ViewMode,
    /// The question currently in flight, if any
    pub pending_question: Option<String>,
}

/// Owns [`ClientState`] and the API handle
pub struct ChatController {
    api: Arc<dyn ChatApi>,
    state: ClientState,
    layout: Layout,
    page_size: u32,
    page_size_override: Option<u32>,
    /// Sequence number of the latest history load issued
    history_seq: u64,
    refresh_after_submit: bool,
}

impl ChatController {
    pub fn new(api: Arc<dyn ChatApi>, layout: Layout) -> Self {
        Self {
            api,
            state: ClientState::default(),
            layout,
            page_size: layout.default_page_size(),
            page_size_override: None,
            history_seq: 0,
            refresh_after_submit: true,
        }
    }

    /// Use a fixed history page size instead of the per-layout default
    pub fn with_page_size(mut self, page_size: Option<u32>) -> Self {
        self.page_size_override = page_size.map(|size| size.clamp(1, MAX_PAGE_SIZE));
        self.page_size = self.page_size_override.unwrap_or_else(|| self.layout.default_page_size());
        self
    }

    /// Whether a successful answer is followed by a history reload
    pub fn refresh_after_submit(mut self, enabled: bool) -> Self {
        self.refresh_after_submit = enabled;
        self
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Requests to issue when the UI first appears
    pub fn initial_commands(&mut self) -> Vec<Command> {
        match self.layout {
            Layout::Transcript => self.refresh().into_iter().collect(),
            Layout::Single => Vec::new(),
        }
    }

    // ----- draft -----

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.state.draft = text.into();
    }

    pub fn draft(&self) -> &str {
        &self.state.draft
    }

    pub fn draft_status(&self) -> DraftStatus {
        DraftStatus::of(&self.state.draft)
    }

    /// Send is enabled only for a valid draft with nothing in flight
    pub fn can_submit(&self) -> bool {
        !self.state.is_sending && self.draft_status() == DraftStatus::Ready
    }

    // ----- commands -----

    /// Start submitting the current draft.
    ///
    /// Returns `None`, without touching the network, when the draft is
    /// invalid or a submission is already outstanding.
    pub fn submit(&mut self) -> Option<Command> {
        if !self.can_submit() {
            debug!(status = ?self.draft_status(), sending = self.state.is_sending, "submit refused");
            return None;
        }

        self.state.is_sending = true;
        self.state.last_error = None;
        self.state.pending_question = Some(self.state.draft.clone());
        Some(Command::Submit {
            question: self.state.draft.clone(),
        })
    }

    /// Start loading a history page; refused while a load is in flight
    pub fn request_history(&mut self, page: u32, per_page: u32) -> Option<Command> {
        if self.state.is_loading_history {
            debug!("history load already in flight");
            return None;
        }

        Some(self.issue_history(page, per_page))
    }

    /// Issue a load that supersedes any load still in flight
    fn issue_history(&mut self, page: u32, per_page: u32) -> Command {
        self.history_seq += 1;
        self.state.is_loading_history = true;
        Command::LoadHistory {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PAGE_SIZE),
            seq: self.history_seq,
        }
    }

    /// Reload the first page at the layout's page size
    pub fn refresh(&mut self) -> Option<Command> {
        self.request_history(1, self.page_size)
    }

    /// Switch between the ask panel and the history panel.
    ///
    /// Entering the history panel reloads it. The transcript layout has no
    /// panels, so this does nothing there.
    pub fn toggle_view(&mut self) -> Option<Command> {
        if self.layout == Layout::Transcript {
            return None;
        }

        self.state.view_mode = self.state.view_mode.toggled();
        debug!(view = self.state.view_mode.display_name(), "view toggled");
        match self.state.view_mode {
            ViewMode::History => self.refresh(),
            ViewMode::Ask => None,
        }
    }

    /// Go back to the ask panel without any request
    pub fn show_ask(&mut self) {
        self.state.view_mode = ViewMode::Ask;
    }

    /// Switch front ends and reload the list at the new page size
    pub fn set_layout(&mut self, layout: Layout) -> Option<Command> {
        if layout == self.layout {
            return None;
        }

        self.layout = layout;
        self.page_size = self.page_size_override.unwrap_or_else(|| layout.default_page_size());
        self.state.view_mode = ViewMode::Ask;
        self.refresh()
    }

    // ----- outcomes -----

    /// Fold a finished request into the state.
    ///
    /// A successful submission asks for a history refresh as its follow-up.
    /// Failures land in `last_error`.
    pub fn apply(&mut self, outcome: Outcome) -> Option<Command> {
        match self.fold(outcome) {
            Ok(next) => next,
            Err(err) => {
                self.record_failure(&err);
                None
            }
        }
    }

    fn fold(&mut self, outcome: Outcome) -> Result<Option<Command>, ClientError> {
        match outcome {
            Outcome::Submitted(result) => {
                self.state.is_sending = false;
                self.state.pending_question = None;
                let answer = result.map_err(ClientError::SendFailure)?;

                self.state.draft.clear();
                self.state.last_error = None;
                self.state.latest_response = Some(answer.response);
                if !self.refresh_after_submit {
                    return Ok(None);
                }
                // Any load already in flight predates this answer.
                Ok(Some(self.issue_history(1, self.page_size)))
            }
            Outcome::HistoryLoaded { seq, result } => {
                if seq != self.history_seq {
                    debug!(seq, latest = self.history_seq, "stale history load dropped");
                    return Ok(None);
                }
                self.state.is_loading_history = false;
                let page = result.map_err(ClientError::HistoryFailure)?;

                debug!(count = page.questions.len(), "exchange list replaced");
                let total_count = page.total_count.max(page.questions.len() as u64);
                self.state.page = Some(PageInfo::of(&page, total_count));
                self.state.total_count = total_count;
                self.state.exchanges = page.questions;
                Ok(None)
            }
        }
    }

    fn record_failure(&mut self, err: &ClientError) {
        error!(cause = %err.api_error(), "{err}");
        self.state.last_error = Some(err.to_string());
    }

    /// Dismiss the current error message
    pub fn clear_error(&mut self) {
        self.state.last_error = None;
    }

    // ----- awaited helpers -----

    /// Run a command and every follow-up it produces
    pub async fn execute(&mut self, command: Command) {
        let mut next = Some(command);
        while let Some(command) = next {
            let outcome = command.run(self.api.as_ref()).await;
            next = self.apply(outcome);
        }
    }

    /// Submit `text` and wait for the answer and the history refresh.
    ///
    /// `Ok(None)` means the text was rejected before any request was made.
    /// A failed refresh after a successful answer is left in `last_error`.
    pub async fn submit_question(&mut self, text: impl Into<String>) -> Result<Option<String>, ClientError> {
        self.set_draft(text);
        let Some(command) = self.submit() else {
            return Ok(None);
        };

        let outcome = command.run(self.api.as_ref()).await;
        match self.fold(outcome) {
            Ok(follow_up) => {
                if let Some(follow_up) = follow_up {
                    self.execute(follow_up).await;
                }
                Ok(self.state.latest_response.clone())
            }
            Err(err) => {
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Load one page of history and wait for it
    pub async fn load_history(&mut self, page: u32, per_page: u32) -> Result<&[Exchange], ClientError> {
        if let Some(command) = self.request_history(page, per_page) {
            let outcome = command.run(self.api.as_ref()).await;
            if let Err(err) = self.fold(outcome) {
                self.record_failure(&err);
                return Err(err);
            }
        }
        Ok(&self.state.exchanges)
    }

    // ----- data feed -----

    /// Exchanges in server order, newest first
    pub fn exchanges(&self) -> &[Exchange] {
        &self.state.exchanges
    }

    /// Exchanges oldest first, for the transcript
    pub fn transcript(&self) -> impl DoubleEndedIterator<Item = &Exchange> + '_ {
        self.state.exchanges.iter().rev()
    }

    pub fn latest_response(&self) -> Option<&str> {
        self.state.latest_response.as_deref()
    }

    pub fn pending_question(&self) -> Option<&str> {
        self.state.pending_question.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.state.last_error.as_deref()
    }

    pub fn view_mode(&self) -> ViewMode {
        self.state.view_mode
    }

    pub fn total_count(&self) -> u64 {
        self.state.total_count
    }

    pub fn page_info(&self) -> Option<PageInfo> {
        self.state.page
    }
}
