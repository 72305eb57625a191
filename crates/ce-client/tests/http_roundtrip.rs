//! End-to-end client tests against a scripted local HTTP server.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ce_client::{
    CancellationToken, CeClient, CeError, ClientConfig, CompileRequest, CompileService,
    LibrarySelection, RetryPolicy,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct Seen {
    request_line: String,
    body: String,
}

/// Serves `(status, extra_headers, body)` replies in order, one per connection.
struct ScriptedServer {
    base_url: String,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl ScriptedServer {
    async fn start(replies: Vec<(u16, &'static str, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let queue = Arc::new(Mutex::new(VecDeque::from(replies)));

        let seen_bg = seen.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    return;
                };
                let (request_line, body) = read_request(&mut sock).await;
                seen_bg.lock().unwrap().push(Seen { request_line, body });

                let (status, headers, body) = queue
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or((500, "", "script exhausted".to_string()));
                let reply = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
                    status,
                    body.len(),
                    headers,
                    body
                );
                let _ = sock.write_all(reply.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });

        ScriptedServer {
            base_url: format!("http://{}", addr),
            seen,
        }
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

async fn read_request(sock: &mut tokio::net::TcpStream) -> (String, String) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = sock.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let head = &text[..head_end];
            let content_length = head
                .lines()
                .find_map(|l| {
                    let lower = l.to_ascii_lowercase();
                    lower
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                let body = String::from_utf8_lossy(&buf[head_end + 4..head_end + 4 + content_length])
                    .to_string();
                let request_line = head.lines().next().unwrap_or("").to_string();
                return (request_line, body);
            }
        }
    }
    (String::new(), String::new())
}

fn fast_config(base_url: &str) -> ClientConfig {
    ClientConfig::new(base_url)
        .with_min_interval(Duration::ZERO)
        .with_timeout(Duration::from_secs(5))
        .with_retry(RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(20),
        })
}

#[tokio::test]
async fn catalog_request_encodes_language_and_fields() {
    let server = ScriptedServer::start(vec![(
        200,
        "",
        r#"[{"id":"g132","name":"x86-64 gcc 13.2","lang":"c++","compilerType":"gcc","semver":"13.2"}]"#
            .to_string(),
    )])
    .await;
    let client = CeClient::new(fast_config(&server.base_url)).unwrap();

    let compilers = client
        .list_compilers(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(compilers.len(), 1);
    assert_eq!(compilers[0].id, "g132");
    let seen = server.seen();
    assert_eq!(seen.len(), 1);
    assert!(seen[0]
        .request_line
        .starts_with("GET /api/compilers/c%2B%2B?fields=id,name,lang,compilerType,semver,instructionSet "));
}

#[tokio::test]
async fn service_unavailable_is_retried() {
    let server = ScriptedServer::start(vec![
        (503, "", "{}".to_string()),
        (429, "Retry-After: 0\r\n", "{}".to_string()),
        (200, "", r#"{"libraries":[{"id":"fmt","versions":["10.2.1"]}]}"#.to_string()),
    ])
    .await;
    let client = CeClient::new(fast_config(&server.base_url)).unwrap();

    let libs = client
        .list_libraries(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(libs[0].id, "fmt");
    assert_eq!(server.seen().len(), 3);
    let snap = client.metrics().snapshot();
    assert_eq!(snap.requests_sent, 3);
    assert_eq!(snap.retries, 2);
}

#[tokio::test]
async fn oversized_retry_after_waits_at_most_max_backoff() {
    let server = ScriptedServer::start(vec![
        (503, "Retry-After: 1e20\r\n", "{}".to_string()),
        (429, "Retry-After: 3600\r\n", "{}".to_string()),
        (200, "", r#"{"libraries":[{"id":"fmt","versions":["10.2.1"]}]}"#.to_string()),
    ])
    .await;
    let client = CeClient::new(fast_config(&server.base_url)).unwrap();

    let start = std::time::Instant::now();
    let libs = client
        .list_libraries(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(libs[0].id, "fmt");
    assert_eq!(server.seen().len(), 3);
    assert!(start.elapsed() < Duration::from_secs(5), "{:?}", start.elapsed());
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = ScriptedServer::start(vec![(404, "", r#"{"error":"nope"}"#.to_string())]).await;
    let client = CeClient::new(fast_config(&server.base_url)).unwrap();

    let err = client
        .list_compilers(&CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        CeError::Http { status, body, .. } => {
            assert_eq!(status, 404);
            assert!(body.contains("nope"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(server.seen().len(), 1);
}

#[tokio::test]
async fn repeated_compile_is_served_from_cache() {
    let server = ScriptedServer::start(vec![(
        200,
        "",
        r#"{"code":1,"stderr":[{"text":"<source>:3:5: error: no member named 'expected'"}]}"#
            .to_string(),
    )])
    .await;
    let client = CeClient::new(fast_config(&server.base_url)).unwrap();
    let request = CompileRequest {
        compiler_id: "g132".into(),
        source: "#include <expected>\nint main() { std::expected<int,int> e; }\n".into(),
        user_arguments: "-std=c++23 -fsyntax-only".into(),
        libraries: vec![LibrarySelection::new("fmt", "10.2.1")],
    };
    let token = CancellationToken::new();

    let first = client.compile(&request, &token).await.unwrap();
    let second = client.compile(&request, &token).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.code, 1);
    assert!(first.stderr.contains("expected"));

    let seen = server.seen();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].request_line.starts_with("POST /api/compiler/g132/compile "));
    let body: serde_json::Value = serde_json::from_str(&seen[0].body).unwrap();
    assert_eq!(body["options"]["userArguments"], "-std=c++23 -fsyntax-only");
    assert_eq!(body["options"]["libraries"][0]["id"], "fmt");
    assert_eq!(client.metrics().snapshot().cache_hits, 1);
}
