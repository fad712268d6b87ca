//! Integration tests for the stream HTTP transport.

use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use claude_streams::config::{ServerConfig, StorageConfig};
use claude_streams::storage::Storage;
use claude_streams::transport::{
    ErrorResponse, StreamServer, NDJSON, STREAM_GENERATION, STREAM_NEXT_OFFSET, STREAM_OFFSET,
    STREAM_TAIL_OFFSET, STREAM_UP_TO_DATE,
};
use reqwest::StatusCode;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const SESSION: &str = "a1b2c3d4-e5f6-4789-abcd-0123456789ab";

struct TestServer {
    addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    storage: Arc<Storage>,
    _dir: TempDir,
}

impl TestServer {
    async fn start(dir: TempDir, storage_config: StorageConfig, server_config: ServerConfig) -> Self {
        let storage = Arc::new(
            Storage::open(dir.path(), storage_config)
                .await
                .expect("Failed to open storage"),
        );
        let cancel = CancellationToken::new();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind listener");
        let addr = listener.local_addr().unwrap();

        let server = StreamServer::new(storage.clone(), cancel.clone()).with_config(server_config);
        let task = tokio::spawn(async move {
            server.serve(listener).await.expect("Server failed");
        });

        Self {
            addr,
            cancel,
            task,
            storage,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    fn session_path(&self) -> std::path::PathBuf {
        self.storage.dir().join(format!("{SESSION}.jsonl"))
    }
}

fn storage_config() -> StorageConfig {
    StorageConfig {
        long_poll_timeout_ms: 5_000,
        debounce_ms: 20,
        rescan_interval_ms: 250,
        ..StorageConfig::default()
    }
}

fn dir_with_session(content: &[u8]) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(format!("{SESSION}.jsonl")), content).unwrap();
    dir
}

fn append(path: &Path, data: &[u8]) {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .expect("Failed to open session file");
    file.write_all(data).expect("Failed to append");
}

fn header<'a>(response: &'a reqwest::Response, name: &reqwest::header::HeaderName) -> &'a str {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {name}"))
        .to_str()
        .unwrap()
}

#[tokio::test]
async fn test_catch_up_read() {
    let server = TestServer::start(
        dir_with_session(b"{\"a\":1}\n{\"b\":2}\n"),
        storage_config(),
        ServerConfig::default(),
    )
    .await;

    let response = reqwest::get(server.url(&format!("/{SESSION}"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, &reqwest::header::CONTENT_TYPE), NDJSON);
    assert_eq!(header(&response, &STREAM_NEXT_OFFSET), "16");
    assert_eq!(header(&response, &STREAM_TAIL_OFFSET), "16");
    assert_eq!(header(&response, &STREAM_UP_TO_DATE), "true");
    assert_eq!(header(&response, &STREAM_GENERATION), "0");
    assert_eq!(response.text().await.unwrap(), "{\"a\":1}\n{\"b\":2}\n");

    // Resume from the offset header
    let client = reqwest::Client::new();
    let response = client
        .get(server.url(&format!("/{SESSION}")))
        .header(STREAM_OFFSET, "8")
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "{\"b\":2}\n");

    // Or from the query parameter
    let response = reqwest::get(server.url(&format!("/{SESSION}?offset=16")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, &STREAM_NEXT_OFFSET), "16");
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_long_poll_receives_append() {
    let server = TestServer::start(
        dir_with_session(b"{\"a\":1}\n"),
        storage_config(),
        ServerConfig::default(),
    )
    .await;
    let handle = server.storage.resolve(SESSION).unwrap();

    let request = tokio::spawn(reqwest::get(
        server.url(&format!("/{SESSION}?offset=8&live=long-poll")),
    ));

    timeout(Duration::from_secs(10), async {
        while handle.waiters() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("long-poll never parked");

    append(&server.session_path(), b"{\"b\":2}\n");

    let response = request.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, &STREAM_NEXT_OFFSET), "16");
    assert_eq!(response.text().await.unwrap(), "{\"b\":2}\n");
}

#[tokio::test]
async fn test_long_poll_timeout_is_no_content() {
    let server = TestServer::start(
        dir_with_session(b"{\"a\":1}\n"),
        StorageConfig {
            long_poll_timeout_ms: 100,
            ..storage_config()
        },
        ServerConfig::default(),
    )
    .await;

    let response = reqwest::get(server.url(&format!("/{SESSION}?offset=8&live=long-poll")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(header(&response, &STREAM_NEXT_OFFSET), "8");
    assert_eq!(header(&response, &STREAM_UP_TO_DATE), "true");
}

#[tokio::test]
async fn test_error_statuses() {
    let server = TestServer::start(
        dir_with_session(b"{\"a\":1}\n"),
        storage_config(),
        ServerConfig::default(),
    )
    .await;

    let response = reqwest::get(server.url("/11111111-1111-4111-8111-111111111111"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.error, "unknown_stream");

    let response = reqwest::get(server.url(&format!("/{SESSION}?offset=99")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.error, "invalid_offset");

    let response = reqwest::get(server.url(&format!("/{SESSION}?offset=abc")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.error, "bad_request");

    let response = reqwest::get(server.url(&format!("/{SESSION}?live=sse")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reset_and_gone_statuses() {
    let server = TestServer::start(
        dir_with_session(&[b'x'; 100]),
        storage_config(),
        ServerConfig::default(),
    )
    .await;
    let handle = server.storage.resolve(SESSION).unwrap();

    std::fs::write(server.session_path(), [b'y'; 40]).unwrap();
    timeout(Duration::from_secs(10), async {
        while handle.generation() == 0 || handle.size() != 40 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("truncation never observed");

    let response = reqwest::get(server.url(&format!("/{SESSION}?offset=100")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(header(&response, &STREAM_GENERATION), "1");
    assert_eq!(header(&response, &STREAM_TAIL_OFFSET), "40");
    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.error, "stream_reset");

    std::fs::remove_file(server.session_path()).unwrap();
    let response = reqwest::get(server.url(&format!("/{SESSION}?offset=0")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.error, "stream_gone");
}

#[tokio::test]
async fn test_history_stream() {
    let server = TestServer::start(
        dir_with_session(b"{}\n"),
        storage_config(),
        ServerConfig::default(),
    )
    .await;

    let response = reqwest::get(server.url("/_history")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    let entry: serde_json::Value = serde_json::from_str(body.lines().next().unwrap()).unwrap();
    assert_eq!(entry["id"], SESSION);
    assert_eq!(entry["index"], 0);
}

#[tokio::test]
async fn test_head_returns_headers_only() {
    let server = TestServer::start(
        dir_with_session(b"{\"a\":1}\n"),
        storage_config(),
        ServerConfig::default(),
    )
    .await;

    let response = reqwest::Client::new()
        .head(server.url(&format!("/{SESSION}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, &STREAM_TAIL_OFFSET), "8");
    assert_eq!(header(&response, &STREAM_NEXT_OFFSET), "0");
    assert_eq!(header(&response, &STREAM_UP_TO_DATE), "false");
}

#[tokio::test]
async fn test_base_path_and_root_redirect() {
    let server = TestServer::start(
        dir_with_session(b"{}\n"),
        storage_config(),
        ServerConfig {
            base_path: "proxy/8214".to_string(),
            ..ServerConfig::default()
        },
    )
    .await;

    let response = reqwest::get(server.url(&format!("/proxy/8214/{SESSION}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = reqwest::get(server.url(&format!("/{SESSION}"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    let response = client.get(server.url("/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        header(&response, &reqwest::header::LOCATION),
        "/proxy/8214/ui/"
    );
}

#[tokio::test]
async fn test_dev_cors_exposes_stream_headers() {
    let server = TestServer::start(
        dir_with_session(b"{}\n"),
        storage_config(),
        ServerConfig {
            cors_permissive: true,
            ..ServerConfig::default()
        },
    )
    .await;

    let response = reqwest::Client::new()
        .get(server.url(&format!("/{SESSION}")))
        .header(reqwest::header::ORIGIN, "http://localhost:5173")
        .send()
        .await
        .unwrap();

    assert_eq!(
        header(&response, &reqwest::header::ACCESS_CONTROL_ALLOW_ORIGIN),
        "*"
    );
    let exposed = header(&response, &reqwest::header::ACCESS_CONTROL_EXPOSE_HEADERS);
    assert!(exposed.contains("stream-next-offset"));
    assert!(exposed.contains("stream-up-to-date"));

    // Preflight for a fetch sending its own content negotiation headers
    let response = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, server.url(&format!("/{SESSION}")))
        .header(reqwest::header::ORIGIN, "http://localhost:5173")
        .header(reqwest::header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .header(
            reqwest::header::ACCESS_CONTROL_REQUEST_HEADERS,
            "content-type, accept, stream-offset",
        )
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let allowed = header(&response, &reqwest::header::ACCESS_CONTROL_ALLOW_HEADERS);
    for name in ["content-type", "accept", "stream-offset", "stream-generation"] {
        assert!(allowed.contains(name), "{name} not allowed: {allowed}");
    }
}

#[tokio::test]
async fn test_graceful_shutdown_releases_long_polls() {
    let server = TestServer::start(
        dir_with_session(b"{}\n"),
        storage_config(),
        ServerConfig::default(),
    )
    .await;
    let handle = server.storage.resolve(SESSION).unwrap();

    let request = tokio::spawn(reqwest::get(
        server.url(&format!("/{SESSION}?offset=3&live=long-poll")),
    ));
    timeout(Duration::from_secs(10), async {
        while handle.waiters() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("long-poll never parked");

    server.cancel.cancel();

    let response = timeout(Duration::from_secs(5), request)
        .await
        .expect("long-poll not released on shutdown")
        .unwrap()
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.bytes().await.unwrap().is_empty());

    timeout(Duration::from_secs(5), server.task)
        .await
        .expect("server did not stop")
        .unwrap();
}
