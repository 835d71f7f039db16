use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use crate::config::ClientConfig;
use crate::error::RequestFailure;

/// Something that can turn a question into an answer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn ask(&self, question: &str) -> Result<String, RequestFailure>;
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    question: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    answer: String,
}

/// HTTP client for the question answering endpoint.
pub struct AnswerClient {
    endpoint: Url,
    timeout: Duration,
    client: reqwest::Client,
}

impl AnswerClient {
    pub fn new(config: &ClientConfig) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            endpoint: config.service_url.clone(),
            timeout: config.request_timeout,
            client,
        })
    }

    // reqwest's own timeout must read the same as the controller's
    fn map_error(&self, err: reqwest::Error) -> RequestFailure {
        if err.is_timeout() {
            return RequestFailure::Timeout(self.timeout);
        }
        RequestFailure::from(err)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl AnswerService for AnswerClient {
    async fn ask(&self, question: &str) -> Result<String, RequestFailure> {
        debug!("Sending question to {}: {:?}", self.endpoint, question);

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&QueryRequest { question })
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Answer service returned {}: {}", status, body);
            return Err(RequestFailure::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| self.map_error(e))?;
        debug!("Received response body: {}", body);
        parse_answer(&body)
    }
}

/// Pull the `answer` field out of a success body.
fn parse_answer(body: &str) -> Result<String, RequestFailure> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| RequestFailure::Malformed(e.to_string()))?;

    serde_json::from_value::<QueryResponse>(value)
        .map(|response| response.answer)
        .map_err(|e| RequestFailure::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    use super::*;

    /// Serve exactly one canned HTTP response and hand back the raw request.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (Url, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = tx.send(String::from_utf8_lossy(&request).to_string());
        });

        let url = Url::parse(&format!("http://{}/query", addr)).unwrap();
        (url, rx)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        body.len() >= length
    }

    fn client_for(url: Url) -> AnswerClient {
        AnswerClient::new(&ClientConfig {
            service_url: url,
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_success_extracts_answer_field() {
        let (url, request) = serve_once("200 OK", r#"{"answer":"4","sources":[]}"#).await;
        let client = client_for(url);

        let answer = client.ask("What is 2+2?").await.unwrap();
        assert_eq!(answer, "4");

        let raw = request.await.unwrap();
        assert!(raw.starts_with("POST /query"));
        assert!(raw.contains(r#"{"question":"What is 2+2?"}"#));
    }

    #[tokio::test]
    async fn test_error_status_is_reported_with_code() {
        let (url, _request) = serve_once("500 Internal Server Error", r#"{"detail":"boom"}"#).await;
        let client = client_for(url);

        let failure = client.ask("ping").await.unwrap_err();
        assert_eq!(failure, RequestFailure::Status(500));
        assert_eq!(failure.to_string(), "Request failed with status code 500");
    }

    #[tokio::test]
    async fn test_missing_answer_field_is_malformed() {
        let (url, _request) = serve_once("200 OK", "{}").await;
        let client = client_for(url);

        let failure = client.ask("ping").await.unwrap_err();
        assert!(matches!(failure, RequestFailure::Malformed(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        // Bind then drop to get a port nobody is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(Url::parse(&format!("http://{}/query", addr)).unwrap());
        let failure = client.ask("ping").await.unwrap_err();
        assert!(matches!(failure, RequestFailure::Transport(_)));
        assert!(!failure.to_string().is_empty());
    }

    #[tokio::test]
    async fn test_stalled_service_reports_configured_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the connection without ever replying.
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let client = AnswerClient::new(&ClientConfig {
            service_url: Url::parse(&format!("http://{}/query", addr)).unwrap(),
            request_timeout: Duration::from_secs(1),
        })
        .unwrap();

        let failure = client.ask("ping").await.unwrap_err();
        assert_eq!(failure, RequestFailure::Timeout(Duration::from_secs(1)));
        assert_eq!(
            failure.to_turn_content(),
            "Error: request timed out after 1s"
        );
    }

    #[tokio::test]
    async fn test_stalled_service_error_turn_is_stable_through_controller() {
        use std::sync::Arc;

        use crate::cli::chat::controller::ConversationController;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                held.push(socket);
            }
        });

        let timeout = Duration::from_secs(1);
        let client = AnswerClient::new(&ClientConfig {
            service_url: Url::parse(&format!("http://{}/query", addr)).unwrap(),
            request_timeout: timeout,
        })
        .unwrap();
        let mut controller = ConversationController::new(Arc::new(client), timeout);

        for _ in 0..3 {
            controller.submit("ping").await;
            let last = controller.transcript().last().unwrap();
            assert_eq!(last.content(), "Error: request timed out after 1s");
        }
    }

    #[test]
    fn test_parse_answer_rejects_non_json() {
        let failure = parse_answer("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(failure, RequestFailure::Malformed(_)));
    }

    #[test]
    fn test_parse_answer_rejects_non_string_answer() {
        let failure = parse_answer(r#"{"answer": 4}"#).unwrap_err();
        assert!(matches!(failure, RequestFailure::Malformed(_)));
    }
}
