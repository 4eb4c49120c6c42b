use async_trait::async_trait;
use collect_core::model::{ElementId, SessionId};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CompletionSummary, ConversationService, RemoteTurn, SessionStart};
use crate::config::RemoteConfig;
use crate::error::RemoteError;

const START_PATH: &str = "data-collection/conversation/start";
const ANSWER_PATH: &str = "data-collection/conversation/answer";
const OPTIONS_PATH: &str = "data-collection/conversation/options";
const UNDO_PATH: &str = "data-collection/conversation/undo";
const COMPLETE_PATH: &str = "data-collection/conversation/complete";

/// `ConversationService` over the data-collection HTTP API.
#[derive(Clone)]
pub struct HttpConversationService {
    client: Client,
    config: RemoteConfig,
}

impl HttpConversationService {
    /// Build a client for `config`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Http` if the HTTP client cannot be constructed.
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        Ok(Self {
            client: config.client()?,
            config,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch_options(&self) -> Result<Vec<String>, RemoteError> {
        let request = self.client.get(self.config.endpoint(OPTIONS_PATH));
        let data: OptionsData = read_envelope(self.authorize(request).send().await?).await?;
        Ok(data.options)
    }

    /// Options for the question just returned by a committed call.
    ///
    /// The session has already moved on by the time this runs, so a failed
    /// lookup degrades the turn to free text instead of failing it.
    async fn options_or_free_text(&self) -> Vec<String> {
        match self.fetch_options().await {
            Ok(options) => options,
            Err(err) => {
                warn!(error = %err, "options lookup failed; treating question as free text");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl ConversationService for HttpConversationService {
    async fn start_session(
        &self,
        element_id: Option<ElementId>,
    ) -> Result<SessionStart, RemoteError> {
        let mut request = self.client.get(self.config.endpoint(START_PATH));
        if let Some(element_id) = element_id {
            request = request.query(&[("element_id", element_id.value())]);
        }
        let data: StartData = read_envelope(self.authorize(request).send().await?).await?;
        let session_id = data
            .session_id
            .ok_or_else(|| RemoteError::MalformedResponse("start returned no session id".into()))?;
        let options = self.options_or_free_text().await;
        debug!(session_id = %session_id, options = options.len(), "remote session opened");

        Ok(SessionStart {
            session_id: SessionId::new(session_id),
            turn: RemoteTurn {
                question: data.question,
                options,
            },
        })
    }

    async fn submit_answer(&self, answer: &str) -> Result<RemoteTurn, RemoteError> {
        let request = self
            .client
            .post(self.config.endpoint(ANSWER_PATH))
            .json(&AnswerRequest { answer });
        let data: AnswerData = read_envelope(self.authorize(request).send().await?).await?;
        let question = data
            .question
            .or(data.message)
            .ok_or_else(|| RemoteError::MalformedResponse("answer returned no question".into()))?;
        let options = self.options_or_free_text().await;
        Ok(RemoteTurn { question, options })
    }

    async fn undo(&self, steps: usize) -> Result<Option<RemoteTurn>, RemoteError> {
        let request = self
            .client
            .delete(self.config.endpoint(UNDO_PATH))
            .query(&[("steps", steps)]);
        let data: UndoData = read_envelope(self.authorize(request).send().await?).await?;
        if data.status.as_deref().is_some_and(|status| status != "success") {
            return Err(RemoteError::Rejected(format!("undo of {steps} step(s) refused")));
        }
        // The undo response names no question; the caller knows which one is active.
        debug!(steps, next_display_order = ?data.next_display_order, "remote undo committed");
        Ok(None)
    }

    async fn complete_session(&self) -> Result<CompletionSummary, RemoteError> {
        let request = self.client.post(self.config.endpoint(COMPLETE_PATH));
        let body: CompleteResponse = read_json(self.authorize(request).send().await?).await?;
        if body.status.as_deref() != Some("success") {
            return Err(RemoteError::Rejected(
                body.message
                    .unwrap_or_else(|| "session could not be completed".into()),
            ));
        }
        let data = body
            .data
            .ok_or_else(|| RemoteError::MalformedResponse("complete returned no data".into()))?;
        Ok(CompletionSummary {
            session_id: data.session_id.map(SessionId::new),
            total_questions_answered: data.total_questions_answered.unwrap_or(0),
            message: data.message.unwrap_or_default(),
        })
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    if !response.status().is_success() {
        return Err(RemoteError::HttpStatus(response.status()));
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|err| RemoteError::MalformedResponse(err.to_string()))
}

async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    let envelope: Envelope<T> = read_json(response).await?;
    Ok(envelope.data)
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct AnswerRequest<'a> {
    answer: &'a str,
}

#[derive(Debug, Deserialize)]
struct StartData {
    question: String,
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnswerData {
    question: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OptionsData {
    #[serde(default)]
    options: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UndoData {
    status: Option<String>,
    next_display_order: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CompleteResponse {
    status: Option<String>,
    message: Option<String>,
    data: Option<CompleteData>,
}

#[derive(Debug, Deserialize)]
struct CompleteData {
    session_id: Option<String>,
    total_questions_answered: Option<u32>,
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const START_BODY: &str = r#"{"message":"Data collection conversation started successfully","data":{"question":"Q1","session_id":"s-1","phase":"question"}}"#;
    const ANSWER_BODY: &str = r#"{"message":"Answer processed successfully","data":{"phase":"question","session_id":"s-1","question":"Q2","progress":0.1}}"#;
    const OPTIONS_BODY: &str = r#"{"message":"Options retrieved successfully","data":{"options":["often","rarely"],"session_id":"s-1"}}"#;
    const UNDO_BODY: &str = r#"{"message":"Last answer undone successfully","data":{"session_id":"s-1","status":"success","next_display_order":1}}"#;

    /// Canned response for requests whose request line starts with `prefix`.
    struct Route {
        prefix: &'static str,
        status: u16,
        body: &'static str,
    }

    fn route(prefix: &'static str, status: u16, body: &'static str) -> Route {
        Route {
            prefix,
            status,
            body,
        }
    }

    /// HTTP/1.1 responder on a loopback port, one request per connection. Unrouted requests get 404.
    /// Returns the API base URL and the request lines seen so far.
    async fn serve(routes: Vec<Route>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut raw = Vec::new();
                let mut buf = [0_u8; 4096];
                let head_end = loop {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break None;
                    }
                    raw.extend_from_slice(&buf[..n]);
                    if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                        break Some(pos + 4);
                    }
                };
                let Some(head_end) = head_end else { continue };
                let head = String::from_utf8_lossy(&raw[..head_end]).to_string();
                let content_length = head
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                while raw.len() < head_end + content_length {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    raw.extend_from_slice(&buf[..n]);
                }

                let request_line = head.lines().next().unwrap_or_default().to_owned();
                let (status, body) = routes
                    .iter()
                    .find(|r| request_line.starts_with(r.prefix))
                    .map_or((404, "{}"), |r| (r.status, r.body));
                log.lock().unwrap().push(request_line);

                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        (format!("http://{addr}/api/v1"), seen)
    }

    fn service(base_url: String) -> HttpConversationService {
        HttpConversationService::new(RemoteConfig::new(base_url)).unwrap()
    }

    #[tokio::test]
    async fn start_reads_question_and_options_from_envelopes() {
        let (base, seen) = serve(vec![
            route("GET /api/v1/data-collection/conversation/start", 200, START_BODY),
            route("GET /api/v1/data-collection/conversation/options", 200, OPTIONS_BODY),
        ])
        .await;

        let start = service(base)
            .start_session(Some(ElementId::new(3)))
            .await
            .unwrap();

        assert_eq!(start.session_id.as_str(), "s-1");
        assert_eq!(start.turn.question, "Q1");
        assert_eq!(start.turn.options, vec!["often", "rarely"]);
        let seen = seen.lock().unwrap();
        assert!(seen[0].contains("element_id=3"), "{seen:?}");
    }

    #[tokio::test]
    async fn undo_commits_on_the_delete_alone() {
        let (base, seen) = serve(vec![route(
            "DELETE /api/v1/data-collection/conversation/undo",
            200,
            UNDO_BODY,
        )])
        .await;

        let turn = service(base).undo(2).await.unwrap();

        assert_eq!(turn, None);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1, "no follow-up lookups after undo: {seen:?}");
        assert!(seen[0].contains("steps=2"));
    }

    #[tokio::test]
    async fn refused_undo_is_rejected() {
        let body = r#"{"message":"Nothing to undo","data":{"session_id":"s-1","status":"error","next_display_order":null}}"#;
        let (base, _) = serve(vec![route(
            "DELETE /api/v1/data-collection/conversation/undo",
            200,
            body,
        )])
        .await;

        let err = service(base).undo(1).await.unwrap_err();

        assert!(matches!(err, RemoteError::Rejected(_)));
    }

    #[tokio::test]
    async fn accepted_answer_survives_options_failure() {
        let (base, seen) = serve(vec![
            route("POST /api/v1/data-collection/conversation/answer", 200, ANSWER_BODY),
            route("GET /api/v1/data-collection/conversation/options", 500, "{}"),
        ])
        .await;

        let turn = service(base).submit_answer("often").await.unwrap();

        assert_eq!(turn.question, "Q2");
        assert!(turn.options.is_empty());
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_answer_post_is_an_error() {
        let (base, _) = serve(vec![route(
            "POST /api/v1/data-collection/conversation/answer",
            422,
            "{}",
        )])
        .await;

        let err = service(base).submit_answer("often").await.unwrap_err();

        assert!(matches!(err, RemoteError::HttpStatus(status) if status.as_u16() == 422));
    }

    #[test]
    fn complete_error_body_has_no_data() {
        let body = r#"{"status":"error","message":"No active session found for user"}"#;
        let parsed: CompleteResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.status.as_deref(), Some("error"));
        assert!(parsed.data.is_none());
    }
}
