//! Typed client for the Crewmind Assistant HTTP API

use crate::config::{Config, MAX_PAGE_SIZE};
use crate::error::ApiError;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Longest question the backend accepts, in characters
pub const MAX_QUESTION_CHARS: usize = 1000;

/// One question/response pair as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub question: String,
    pub response: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Body of `POST /api/v1/ask`
#[derive(Debug, Clone, Serialize)]
pub struct AskRequest<'a> {
    pub question: &'a str,
}

/// Success body of `POST /api/v1/ask`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AskResponse {
    pub response: String,
    #[serde(default, deserialize_with = "timestamp::option::deserialize")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Success body of `GET /api/v1/history`, newest exchange first
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryPage {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub questions: Vec<Exchange>,
    #[serde(default)]
    pub total_count: u64,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

fn first_page() -> u32 {
    1
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Exchange>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Exchange>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Remote operations the chat controller depends on
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Submit a question and receive the assistant's answer
    async fn ask(&self, question: &str) -> Result<AskResponse, ApiError>;

    /// Fetch one page of past exchanges
    async fn history(&self, page: u32, per_page: u32) -> Result<HistoryPage, ApiError>;

    /// Fetch a single stored exchange by id
    async fn question(&self, id: &str) -> Result<Exchange, ApiError>;
}

/// HTTP implementation of [`ChatApi`]
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    api_root: Url,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        let api_root = format!("{}/api/v1", config.api_root());
        let api_root = Url::parse(&api_root)
            .with_context(|| format!("Invalid API address '{api_root}'"))?;
        if api_root.cannot_be_a_base() {
            bail!("API address '{api_root}' cannot hold a path");
        }

        Ok(Self { client, api_root })
    }

    /// `api_root` plus `segments`, each percent-encoded as a single path segment
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_root.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Turn a response into `T`, mapping non-2xx statuses to [`ApiError::Status`]
    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .map(|body| match body.detail {
                    serde_json::Value::String(text) => text,
                    other => other.to_string(),
                });
            return Err(ApiError::Status { status, detail });
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl ChatApi for ApiClient {
    async fn ask(&self, question: &str) -> Result<AskResponse, ApiError> {
        let url = self.endpoint(&["ask"]);
        info!(chars = question.chars().count(), "submitting question");

        let response = self
            .client
            .post(url)
            .json(&AskRequest { question })
            .send()
            .await?;

        let answer: AskResponse = Self::decode(response).await?;
        debug!(chars = answer.response.chars().count(), "received answer");
        Ok(answer)
    }

    async fn history(&self, page: u32, per_page: u32) -> Result<HistoryPage, ApiError> {
        let url = self.endpoint(&["history"]);
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PAGE_SIZE);
        info!(page, per_page, "fetching conversation history");

        let response = self
            .client
            .get(url)
            .query(&[("page", page), ("per_page", per_page)])
            .send()
            .await?;

        let mut history: HistoryPage = Self::decode(response).await?;
        if history.per_page == 0 {
            history.per_page = per_page;
        }
        debug!(
            returned = history.questions.len(),
            total = history.total_count,
            "history page received"
        );
        Ok(history)
    }

    async fn question(&self, id: &str) -> Result<Exchange, ApiError> {
        let url = self.endpoint(&["question", id]);
        info!(id, "fetching stored question");

        let response = self.client.get(url).send().await?;
        Self::decode(response).await
    }
}

/// Serde adapters for backend timestamps.
///
/// The backend stores `datetime.utcnow()`, which serializes without an offset
/// (`2024-05-01T12:30:00.123456`, sometimes with a space instead of `T`).
/// Offset-less values are read as UTC; RFC 3339 values are converted.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer};

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                None => Ok(None),
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_server;
    use chrono::{Datelike, Timelike};
    use tokio::net::TcpListener;

    fn client_for(base_url: &str) -> ApiClient {
        let mut config = Config::default();
        config.set_base_url(base_url.to_string()).unwrap();
        ApiClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn ask_posts_question_and_decodes_answer() {
        let (base, captured) =
            spawn_server(vec![(200, r#"{"response":"4","timestamp":"2024-05-01T12:30:00.123456"}"#)]).await;
        let client = client_for(&base);

        let answer = client.ask("What is 2+2?").await.unwrap();

        assert_eq!(answer.response, "4");
        assert_eq!(answer.timestamp.unwrap().hour(), 12);
        let requests = captured.lock().await;
        assert_eq!(requests[0].0, "POST /api/v1/ask HTTP/1.1");
        let body: serde_json::Value = serde_json::from_str(&requests[0].1).unwrap();
        assert_eq!(body, serde_json::json!({"question": "What is 2+2?"}));
    }

    #[tokio::test]
    async fn history_sends_paging_query() {
        let (base, captured) = spawn_server(vec![(
            200,
            r#"{"questions":[{"_id":"abc","question":"q","response":"r","timestamp":"2024-05-01 08:00:00"}],"total_count":1,"page":1,"per_page":10,"total_pages":1}"#,
        )])
        .await;
        let client = client_for(&format!("{base}/"));

        let page = client.history(1, 10).await.unwrap();

        assert_eq!(page.questions.len(), 1);
        assert_eq!(page.questions[0].id.as_deref(), Some("abc"));
        assert_eq!(page.total_pages, Some(1));
        assert_eq!(
            captured.lock().await[0].0,
            "GET /api/v1/history?page=1&per_page=10 HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn non_success_status_carries_detail() {
        let (base, _) = spawn_server(vec![(
            500,
            r#"{"detail":"Internal server error while retrieving history"}"#,
        )])
        .await;
        let client = client_for(&base);

        let err = client.history(1, 10).await.unwrap_err();

        match err {
            ApiError::Status { status, detail } => {
                assert_eq!(status.as_u16(), 500);
                assert_eq!(detail.as_deref(), Some("Internal server error while retrieving history"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let (base, _) = spawn_server(vec![(200, r#"{"answer":"4"}"#)]).await;
        let client = client_for(&base);

        let err = client.ask("hi").await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn unknown_question_is_not_found() {
        let (base, captured) = spawn_server(vec![(404, r#"{"detail":"Question not found"}"#)]).await;
        let client = client_for(&base);

        let err = client.question("665f1c").await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(captured.lock().await[0].0, "GET /api/v1/question/665f1c HTTP/1.1");
    }

    #[tokio::test]
    async fn question_id_stays_one_path_segment() {
        let (base, captured) = spawn_server(vec![(404, r#"{"detail":"Question not found"}"#)]).await;
        let client = client_for(&base);

        let err = client.question("../history").await.unwrap_err();

        assert!(err.is_not_found());
        let request_line = captured.lock().await[0].0.clone();
        assert!(request_line.starts_with("GET /api/v1/question/"), "{request_line}");
        assert!(request_line.contains("%2F"), "{request_line}");
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = client_for(&format!("http://{addr}"));

        let err = client.ask("hi").await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }

    #[test]
    fn missing_questions_means_empty_history() {
        let page: HistoryPage = serde_json::from_str(r#"{"total_count":0}"#).unwrap();
        assert!(page.questions.is_empty());
        assert_eq!(page.page, 1);

        let page: HistoryPage = serde_json::from_str(r#"{"questions":null}"#).unwrap();
        assert!(page.questions.is_empty());
    }

    #[test]
    fn timestamps_accept_naive_and_offset_forms() {
        let naive = timestamp::parse("2024-05-01T12:30:00.123456").unwrap();
        let spaced = timestamp::parse("2024-05-01 12:30:00").unwrap();
        let offset = timestamp::parse("2024-05-01T14:30:00+02:00").unwrap();

        assert_eq!(naive.day(), 1);
        assert_eq!(spaced.minute(), 30);
        assert_eq!(offset.hour(), 12);
        assert!(timestamp::parse("yesterday").is_none());
    }
}
