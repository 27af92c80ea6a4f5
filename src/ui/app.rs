use crate::api::{ApiClient, ChatApi};
use crate::config::Config;
use crate::controller::{ChatController, Outcome};
use crate::ui::conversation::manager::CommandDispatcher;
use crate::ui::conversation::{ConversationAction, ConversationManager};
use crate::events::TuiEvent;
use crate::ui::tui::{self, EventHandler, Tui};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Run the interactive client until the user quits
pub async fn run(config: &Config) -> Result<()> {
    let api: Arc<dyn ChatApi> = Arc::new(ApiClient::new(config)?);
    let controller =
        ChatController::new(Arc::clone(&api), config.layout).with_page_size(config.history_page_size);
    let (dispatcher, outcomes) = CommandDispatcher::new(api);
    let mut manager = ConversationManager::new(controller, dispatcher);

    info!(base_url = %config.api_root(), layout = config.layout.as_ref(), "starting tui");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = event_loop(&mut terminal, &mut manager, outcomes).await;
    tui::restore()?;

    info!("tui closed");
    result
}

async fn event_loop(
    terminal: &mut Tui,
    manager: &mut ConversationManager,
    mut outcomes: mpsc::UnboundedReceiver<Outcome>,
) -> Result<()> {
    let mut events = EventHandler::new();
    manager.start();

    loop {
        terminal.draw(|frame| frame.render_widget(&*manager, frame.size()))?;

        tokio::select! {
            event = events.next() => match event {
                Some(TuiEvent::Key(key)) => {
                    if manager.handle_key(key) == ConversationAction::Exit {
                        break;
                    }
                }
                Some(TuiEvent::Resize(..)) | Some(TuiEvent::Tick) => {}
                None => break,
            },
            Some(outcome) = outcomes.recv() => manager.apply(outcome),
        }
    }

    Ok(())
}
