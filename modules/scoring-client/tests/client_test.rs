//! Request/response tests for `ScoringClient` against a one-shot local HTTP server.

use std::time::Duration;

use scoring_client::{ScoringClient, ScoringError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

struct Captured {
    head: String,
    body: String,
}

impl Captured {
    fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }
}

/// Accept one connection, capture the request, answer with `status` and `body`.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/predict", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before headers were complete");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before body was complete");
            buf.extend_from_slice(&chunk[..n]);
        }
        let request_body = String::from_utf8_lossy(&buf[header_end..]).to_string();

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = stream.shutdown().await;

        Captured {
            head,
            body: request_body,
        }
    });

    (url, handle)
}

fn client(url: &str) -> ScoringClient {
    ScoringClient::new(url, Duration::from_secs(5)).unwrap()
}

const PAYLOAD: &str = r#"[{"destination_transport_port":443},{"destination_transport_port":53}]"#;

#[tokio::test]
async fn posts_payload_and_decodes_scores() {
    let (url, server) = serve_once("200 OK", "[0.91, 0.07]").await;

    let scores = client(&url).predict(PAYLOAD.to_string()).await.unwrap();
    let seen = server.await.unwrap();

    assert_eq!(scores, vec![0.91, 0.07]);
    assert!(
        seen.request_line().starts_with("POST /predict "),
        "request line: {}",
        seen.request_line()
    );
    assert_eq!(
        seen.header("content-type").as_deref(),
        Some("application/json; charset=UTF-8")
    );
    assert_eq!(seen.body, PAYLOAD);
}

#[tokio::test]
async fn response_length_is_not_checked_by_client() {
    let (url, server) = serve_once("200 OK", "[0.5]").await;

    let scores = client(&url).predict(PAYLOAD.to_string()).await.unwrap();
    server.await.unwrap();

    assert_eq!(scores.len(), 1);
}

#[tokio::test]
async fn non_success_status_is_api_error() {
    let (url, server) = serve_once("503 Service Unavailable", r#"{"detail":"model loading"}"#).await;

    let err = client(&url).predict(PAYLOAD.to_string()).await.unwrap_err();
    server.await.unwrap();

    match err {
        ScoringError::Api { status, message } => {
            assert_eq!(status, 503);
            assert!(message.contains("model loading"));
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn non_array_body_is_parse_error() {
    let (url, server) = serve_once("200 OK", r#"{"error":"bad input"}"#).await;

    let err = client(&url).predict(PAYLOAD.to_string()).await.unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, ScoringError::Parse(_)), "got {err:?}");
}
