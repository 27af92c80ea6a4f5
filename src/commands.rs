use anyhow::{bail, Context, Result};
use crate::api::{ApiClient, ChatApi, Exchange, MAX_QUESTION_CHARS};
use crate::config::{Config, MAX_PAGE_SIZE};
use crate::controller::{ChatController, DraftStatus};
use std::io::{self, Write};
use std::sync::Arc;

fn controller(config: &Config) -> Result<ChatController> {
    let api: Arc<dyn ChatApi> = Arc::new(ApiClient::new(config)?);
    Ok(ChatController::new(api, config.layout).with_page_size(config.history_page_size))
}

fn write_exchange(out: &mut impl Write, exchange: &Exchange) -> Result<()> {
    let stamp = exchange
        .timestamp
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S");
    match &exchange.id {
        Some(id) => writeln!(out, "🕒 {}  ({})", stamp, id)?,
        None => writeln!(out, "🕒 {}", stamp)?,
    }
    writeln!(out, "❓ {}", exchange.question)?;
    writeln!(out, "💬 {}", exchange.response)?;
    Ok(())
}

pub async fn ask(config: &Config, question: &str) -> Result<()> {
    write_answer(config, question, &mut io::stdout()).await
}

async fn write_answer(config: &Config, question: &str, out: &mut impl Write) -> Result<()> {
    // Nothing here shows the history, so skip the reload after the answer
    let mut controller = controller(config)?.refresh_after_submit(false);
    let answer = controller
        .submit_question(question)
        .await
        .context("Could not get an answer")?;

    let Some(response) = answer else {
        match DraftStatus::of(question) {
            DraftStatus::Empty => bail!("Question is empty"),
            DraftStatus::TooLong { len } => bail!(
                "Question is {} characters; the limit is {}",
                len,
                MAX_QUESTION_CHARS
            ),
            DraftStatus::Ready => bail!("Question was not sent"),
        }
    };

    writeln!(out, "{}", response)?;
    Ok(())
}

pub async fn history(config: &Config, page: u32, per_page: Option<u32>) -> Result<()> {
    write_history(config, page, per_page, &mut io::stdout()).await
}

async fn write_history(
    config: &Config,
    page: u32,
    per_page: Option<u32>,
    out: &mut impl Write,
) -> Result<()> {
    let mut controller = controller(config)?;
    let per_page = per_page
        .map(|size| size.clamp(1, MAX_PAGE_SIZE))
        .unwrap_or_else(|| config.page_size_for(config.layout));

    let exchanges = controller
        .load_history(page.max(1), per_page)
        .await
        .context("Could not load history")?;

    if exchanges.is_empty() {
        writeln!(out, "📭 No conversation history yet. Ask your first question!")?;
        return Ok(());
    }

    writeln!(out, "📜 Conversation History")?;
    writeln!(out, "{}", "=".repeat(50))?;
    for exchange in exchanges {
        write_exchange(out, exchange)?;
        writeln!(out)?;
    }

    if let Some(info) = controller.page_info() {
        writeln!(
            out,
            "Page {} of {} ({} exchanges)",
            info.page,
            info.total_pages,
            controller.total_count()
        )?;
    }

    Ok(())
}

pub async fn show(config: &Config, id: &str) -> Result<()> {
    write_exchange_by_id(config, id, &mut io::stdout()).await
}

async fn write_exchange_by_id(config: &Config, id: &str, out: &mut impl Write) -> Result<()> {
    let api = ApiClient::new(config)?;
    match api.question(id).await {
        Ok(exchange) => write_exchange(out, &exchange),
        Err(err) if err.is_not_found() => bail!("No exchange with id '{}'", id),
        Err(err) => Err(err).context("Could not load the exchange"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_server;

    fn config_for(base_url: &str) -> Config {
        let mut config = Config::default();
        config.set_base_url(base_url.to_string()).unwrap();
        config
    }

    fn printed(out: Vec<u8>) -> String {
        String::from_utf8(out).unwrap()
    }

    const TWO_EXCHANGES: &str = r#"{"questions":[
        {"_id":"b2","question":"What is 3+3?","response":"6","timestamp":"2024-05-01T12:31:00"},
        {"_id":"a1","question":"What is 2+2?","response":"4","timestamp":"2024-05-01T12:30:00"}
    ],"total_count":25,"page":1,"per_page":10,"total_pages":3}"#;

    #[tokio::test]
    async fn ask_prints_the_answer_without_reloading_history() {
        let (base, captured) = spawn_server(vec![(200, r#"{"response":"4"}"#)]).await;
        let mut out = Vec::new();

        write_answer(&config_for(&base), "What is 2+2?", &mut out)
            .await
            .unwrap();

        assert_eq!(printed(out), "4\n");
        let requests = captured.lock().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "POST /api/v1/ask HTTP/1.1");
    }

    #[tokio::test]
    async fn ask_fails_when_the_backend_does() {
        let (base, _) = spawn_server(vec![(500, r#"{"detail":"boom"}"#)]).await;
        let mut out = Vec::new();

        let err = write_answer(&config_for(&base), "What is 2+2?", &mut out)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Could not get an answer"));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn ask_rejects_invalid_questions_before_sending() {
        let (base, captured) = spawn_server(Vec::new()).await;
        let config = config_for(&base);

        let err = write_answer(&config, "   ", &mut Vec::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Question is empty");

        let too_long = "x".repeat(MAX_QUESTION_CHARS + 1);
        let err = write_answer(&config, &too_long, &mut Vec::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Question is 1001 characters; the limit is 1000");

        assert!(captured.lock().await.is_empty());
    }

    #[tokio::test]
    async fn history_prints_exchanges_and_server_page_count() {
        let (base, captured) = spawn_server(vec![(200, TWO_EXCHANGES)]).await;
        let mut out = Vec::new();

        write_history(&config_for(&base), 1, Some(10), &mut out)
            .await
            .unwrap();

        let text = printed(out);
        assert!(text.contains("❓ What is 3+3?"));
        assert!(text.contains("💬 4"));
        assert!(text.find("3+3").unwrap() < text.find("2+2").unwrap());
        assert!(text.ends_with("Page 1 of 3 (25 exchanges)\n"));
        assert_eq!(
            captured.lock().await[0].0,
            "GET /api/v1/history?page=1&per_page=10 HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn empty_history_says_so() {
        let (base, _) = spawn_server(vec![(200, r#"{"questions":[],"total_count":0}"#)]).await;
        let mut out = Vec::new();

        write_history(&config_for(&base), 1, None, &mut out).await.unwrap();

        assert!(printed(out).contains("No conversation history yet"));
    }

    #[tokio::test]
    async fn history_fails_on_server_error() {
        let (base, _) = spawn_server(vec![(500, "{}")]).await;

        let err = write_history(&config_for(&base), 1, None, &mut Vec::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Could not load history"));
    }

    #[tokio::test]
    async fn show_prints_one_exchange() {
        let (base, _) = spawn_server(vec![(
            200,
            r#"{"_id":"a1","question":"What is 2+2?","response":"4","timestamp":"2024-05-01T12:30:00"}"#,
        )])
        .await;
        let mut out = Vec::new();

        write_exchange_by_id(&config_for(&base), "a1", &mut out).await.unwrap();

        let text = printed(out);
        assert!(text.contains("(a1)"));
        assert!(text.contains("❓ What is 2+2?"));
    }

    #[tokio::test]
    async fn show_reports_unknown_ids() {
        let (base, _) = spawn_server(vec![(404, r#"{"detail":"Question not found"}"#)]).await;

        let err = write_exchange_by_id(&config_for(&base), "missing", &mut Vec::new())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "No exchange with id 'missing'");
    }

    #[tokio::test]
    async fn show_reports_other_failures() {
        let (base, _) = spawn_server(vec![(500, "{}")]).await;

        let err = write_exchange_by_id(&config_for(&base), "a1", &mut Vec::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Could not load the exchange"));
    }
}
