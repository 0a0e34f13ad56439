//! HTTP server for the demo page
//! Simple HTTP/1.1 handling on top of tokio

use crate::error::{AskError, Result};
use crate::page::{render_json, render_page};
use crate::session::AskService;
use reqwest::Url;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

const MAX_REQUEST_BYTES: usize = 64 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const SESSION_COOKIE: &str = "session";

/// Parsed HTTP request
#[derive(Debug, Default)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl Request {
    pub fn parse(raw: &str) -> Option<Self> {
        let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
        let mut lines = head.lines();

        let mut parts = lines.next()?.split_whitespace();
        let method = parts.next()?.to_string();
        let target = parts.next()?;

        let url = Url::parse(&format!("http://localhost{}", target)).ok()?;
        let mut path = url.path().trim_end_matches('/').to_string();
        if path.is_empty() {
            path = "/".to_string();
        }
        let query = url.query_pairs().into_owned().collect();

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((key, value)) = line.split_once(':') {
                headers.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
        }

        Some(Self {
            method,
            path,
            query,
            headers,
            body: body.to_string(),
        })
    }

    /// Session id from the `session` cookie
    pub fn session_id(&self) -> Option<Uuid> {
        self.headers.get("cookie").and_then(|cookies| {
            cookies.split(';').find_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                if name == SESSION_COOKIE {
                    Uuid::parse_str(value).ok()
                } else {
                    None
                }
            })
        })
    }
}

/// HTTP response ready to be written
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub reason: &'static str,
    pub content_type: &'static str,
    pub body: String,
    pub set_session: Option<Uuid>,
}

impl Response {
    fn new(status: u16, reason: &'static str, content_type: &'static str, body: String) -> Self {
        Self {
            status,
            reason,
            content_type,
            body,
            set_session: None,
        }
    }

    fn json(status: u16, reason: &'static str, body: &serde_json::Value) -> Self {
        Self::new(status, reason, "application/json", body.to_string())
    }

    pub fn to_http(&self) -> String {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            self.reason,
            self.content_type,
            self.body.len()
        );
        if let Some(id) = self.set_session {
            head.push_str(&format!(
                "Set-Cookie: {}={}; Path=/; HttpOnly; SameSite=Lax\r\n",
                SESSION_COOKIE, id
            ));
        }
        format!("{}\r\n{}", head, self.body)
    }
}

pub async fn serve(service: AskService, bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!("Server listening on http://{}", bind);

    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("New connection from: {}", addr);
        let service = service.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &service).await {
                warn!("Connection from {} failed: {}", addr, e);
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, service: &AskService) -> Result<()> {
    let raw = read_request(&mut stream, READ_TIMEOUT).await?;
    let response = match Request::parse(&raw) {
        Some(request) => handle_request(service, request).await,
        None => Response::json(400, "Bad Request", &serde_json::json!({"error": "Malformed request"})),
    };
    stream.write_all(response.to_http().as_bytes()).await?;
    Ok(())
}

/// Read one request, giving up after `limit`
async fn read_request<R>(stream: &mut R, limit: Duration) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    tokio::time::timeout(limit, read_until_complete(stream))
        .await
        .map_err(|_| AskError::Http("Timed out reading request".to_string()))?
}

async fn read_until_complete<R>(stream: &mut R) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut data = Vec::new();
    let mut buffer = [0u8; 4096];

    loop {
        let n = stream.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buffer[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(AskError::Http("Request too large".to_string()));
        }
        if let Some(header_end) = find_header_end(&data) {
            let head = String::from_utf8_lossy(&data[..header_end]);
            let body_len = content_length(&head);
            if body_len > MAX_REQUEST_BYTES {
                return Err(AskError::Http("Request too large".to_string()));
            }
            if data.len() >= header_end + 4 + body_len {
                break;
            }
        }
    }

    Ok(String::from_utf8_lossy(&data).into_owned())
}

fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Route a parsed request
pub async fn handle_request(service: &AskService, request: Request) -> Response {
    debug!("Request: {} {}", request.method, request.path);

    let existing = request.session_id();
    // Requests without a session cookie get a fresh id; the store keeps it once a question is accepted
    let session = || existing.unwrap_or_else(|| service.sessions().create());

    let (mut response, session) = match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/api/health") => (
            Response::json(200, "OK", &serde_json::json!({"status": "ok", "service": "askdata"})),
            None,
        ),
        ("GET", "/") => {
            let id = session();
            let question = request.query.get("question").map(|q| q.as_str());
            let submission = service.submit(id, question).await;
            (Response::new(200, "OK", "text/html", render_page(&submission)), Some(id))
        }
        ("POST", "/api/ask") => {
            let id = session();
            let question = serde_json::from_str::<serde_json::Value>(&request.body)
                .ok()
                .and_then(|json| json.get("question").and_then(|v| v.as_str()).map(|s| s.to_string()));
            let submission = service.submit(id, question.as_deref()).await;
            (Response::json(200, "OK", &render_json(&submission)), Some(id))
        }
        _ => (
            Response::json(404, "Not Found", &serde_json::json!({"error": "Not found"})),
            None,
        ),
    };

    if existing.is_none() {
        response.set_session = session;
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get_with_query() {
        let raw = "GET /?question=Top+5+countries%3F HTTP/1.1\r\nHost: localhost\r\nCookie: theme=dark; session=67e55044-10b1-426f-9247-bb680e5fe0c8\r\n\r\n";
        let request = Request::parse(raw).unwrap();

        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/");
        assert_eq!(request.query.get("question").unwrap(), "Top 5 countries?");
        assert_eq!(
            request.session_id(),
            Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").ok()
        );
    }

    #[test]
    fn test_parse_post_body() {
        let raw = "POST /api/ask/ HTTP/1.1\r\nContent-Length: 17\r\n\r\n{\"question\":\"q\"}";
        let request = Request::parse(raw).unwrap();

        assert_eq!(request.path, "/api/ask");
        assert_eq!(request.body, "{\"question\":\"q\"}");
        assert!(request.session_id().is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Request::parse("").is_none());
        assert!(Request::parse("GET").is_none());
    }

    #[test]
    fn test_content_length() {
        assert_eq!(content_length("POST / HTTP/1.1\r\ncontent-length: 42"), 42);
        assert_eq!(content_length("GET / HTTP/1.1"), 0);
    }

    #[tokio::test]
    async fn test_read_request_waits_for_body() {
        let mut input: &[u8] = b"POST /api/ask HTTP/1.1\r\nContent-Length: 16\r\n\r\n{\"question\":\"q\"}";
        let raw = read_request(&mut input, READ_TIMEOUT).await.unwrap();
        assert!(raw.ends_with("{\"question\":\"q\"}"));
    }

    #[tokio::test]
    async fn test_read_request_rejects_oversized_content_length() {
        for length in ["18446744073709551615", "70000"] {
            let raw = format!("POST /api/ask HTTP/1.1\r\nContent-Length: {}\r\n\r\n{{}}", length);
            let mut input = raw.as_bytes();
            let result = read_request(&mut input, READ_TIMEOUT).await;
            assert!(matches!(result, Err(AskError::Http(_))), "length {}", length);
        }
    }

    #[tokio::test]
    async fn test_read_request_times_out_on_stalled_client() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();

        let result = read_request(&mut server, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(AskError::Http(ref msg)) if msg.contains("Timed out")));
        drop(client);
    }

    #[test]
    fn test_response_sets_cookie() {
        let mut response = Response::new(200, "OK", "text/html", "<p>hi</p>".to_string());
        let id = Uuid::new_v4();
        response.set_session = Some(id);
        let http = response.to_http();

        assert!(http.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(http.contains("Content-Length: 9\r\n"));
        assert!(http.contains(&format!("Set-Cookie: session={}", id)));
        assert!(http.ends_with("\r\n\r\n<p>hi</p>"));
    }
}
