use cloudswarm::config::SearchConfig;
use cloudswarm::tool_protocol::{ToolError, ToolInvoker, ToolMetadata, ToolRegistry, ToolResult};
use cloudswarm::tool_protocols::{CodeExecutionProtocol, CustomToolProtocol, WebProtocol};
use cloudswarm::tools::{CodeExecutor, WebError, WebFetcher, WebSearch};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Minimal HTTP server answering GETs by path. Returns the base URL and the
/// request lines it saw.
async fn serve(
    routes: Vec<(&'static str, u16, &'static str, String)>,
) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let mut buf = vec![0u8; 16 * 1024];
            let mut read = 0;
            loop {
                let n = socket.read(&mut buf[read..]).await.unwrap_or(0);
                read += n;
                if n == 0 || buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let request = String::from_utf8_lossy(&buf[..read]).to_string();
            let line = request.lines().next().unwrap_or_default().to_string();
            let path = line.split_whitespace().nth(1).unwrap_or("/").to_string();
            log.lock().unwrap().push(line);

            let (status, content_type, body) = routes
                .iter()
                .find(|(prefix, ..)| path.starts_with(prefix))
                .map(|(_, s, ct, b)| (*s, *ct, b.clone()))
                .unwrap_or((404, "text/plain", "not found".to_string()));
            let response = format!(
                "HTTP/1.1 {} X\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                content_type,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    (format!("http://{}", addr), seen)
}

const PAGE: &str = "<html><head><style>p { color: red }</style><script>var x = 1;</script></head>\
<body><h1>Sine waves</h1><p>Use numpy.sin and matplotlib.</p></body></html>";

#[tokio::test]
async fn test_fetcher_extracts_visible_text() {
    let (base, _) = serve(vec![("/page", 200, "text/html", PAGE.to_string())]).await;

    let text = WebFetcher::new()
        .fetch(&format!("{}/page", base))
        .await
        .unwrap();

    assert_eq!(text, "Sine waves Use numpy.sin and matplotlib.");
}

#[tokio::test]
async fn test_fetcher_classifies_http_errors() {
    let (base, _) = serve(vec![
        ("/busy", 503, "text/plain", "busy".to_string()),
        ("/gone", 404, "text/plain", "gone".to_string()),
    ])
    .await;
    let fetcher = WebFetcher::new();

    let busy = fetcher.fetch(&format!("{}/busy", base)).await.unwrap_err();
    assert!(busy.is_retryable());
    let gone = fetcher.fetch(&format!("{}/gone", base)).await.unwrap_err();
    assert!(!gone.is_retryable());
    assert!(matches!(gone, WebError::Fetch { .. }));
}

#[tokio::test]
async fn test_search_enriches_hits_with_page_bodies() {
    let (pages, _) = serve(vec![("/page", 200, "text/html", PAGE.to_string())]).await;
    let results = serde_json::json!({
        "items": [
            {"title": "Plotting", "link": format!("{}/page", pages), "snippet": "numpy"},
            {"title": "Dead link", "link": format!("{}/missing", pages), "snippet": "404"},
        ]
    })
    .to_string();
    let (api, api_seen) = serve(vec![("/search", 200, "application/json", results)]).await;

    let search = WebSearch::new(SearchConfig {
        api_key: Some("key".into()),
        engine_id: Some("engine".into()),
        delay: Duration::ZERO,
        ..SearchConfig::default()
    })
    .with_endpoint(format!("{}/search", api));

    let hits = search.search("sine wave & plot", Some(25)).await.unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].title, "Plotting");
    assert_eq!(hits[0].body, "Sine waves Use numpy.sin and matplotlib.");
    assert_eq!(hits[1].body, "");

    let request = api_seen.lock().unwrap()[0].clone();
    assert!(request.contains("q=sine%20wave%20%26%20plot"));
    assert!(request.contains("num=10"));
    assert!(request.contains("cx=engine"));
}

#[tokio::test]
async fn test_search_api_errors_surface() {
    let quota = r#"{"error":"quota"}"#.to_string();
    let (api, _) = serve(vec![("/search", 403, "application/json", quota)]).await;
    let search = WebSearch::new(SearchConfig {
        api_key: Some("key".into()),
        engine_id: Some("engine".into()),
        ..SearchConfig::default()
    })
    .with_endpoint(format!("{}/search", api));

    match search.search("anything", None).await {
        Err(WebError::Api { status, body }) => {
            assert_eq!(status, 403);
            assert!(body.contains("quota"));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn test_web_protocol_through_invoker() {
    let (base, _) = serve(vec![
        ("/page", 200, "text/html", PAGE.to_string()),
        ("/busy", 502, "text/plain", "bad gateway".to_string()),
    ])
    .await;
    let mut registry = ToolRegistry::new();
    registry
        .discover(Arc::new(WebProtocol::new(WebFetcher::new())))
        .await
        .unwrap();
    assert!(!registry.contains("google_search"));
    let invoker = ToolInvoker::new(Arc::new(registry), Duration::from_secs(5));

    let ok = invoker
        .invoke(
            "get_page_content",
            serde_json::json!({"url": format!("{}/page", base)}),
            None,
        )
        .await
        .unwrap();
    assert!(ok.output["content"].as_str().unwrap().contains("matplotlib"));

    let err = invoker
        .invoke(
            "get_page_content",
            serde_json::json!({"url": format!("{}/busy", base)}),
            None,
        )
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    let missing = invoker
        .invoke("get_page_content", serde_json::json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(missing, ToolError::InvalidParameters(_)));
}

#[tokio::test]
async fn test_code_execution_reports_failed_scripts_as_data() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Arc::new(CodeExecutor::new(dir.path()));
    let mut registry = ToolRegistry::new();
    registry
        .discover(Arc::new(CodeExecutionProtocol::new(executor)))
        .await
        .unwrap();
    let invoker = ToolInvoker::new(Arc::new(registry), Duration::from_secs(30));

    let ok = invoker
        .invoke(
            "execute_code",
            serde_json::json!({"code": "echo hello", "language": "bash"}),
            None,
        )
        .await
        .unwrap();
    assert_eq!(ok.output["success"], true);
    assert_eq!(ok.output["stdout"].as_str().unwrap().trim(), "hello");

    let failed = invoker
        .invoke(
            "execute_code",
            serde_json::json!({"code": "echo oops >&2; exit 3", "language": "sh"}),
            None,
        )
        .await
        .unwrap();
    assert_eq!(failed.output["success"], false);
    assert_eq!(failed.output["exit_code"], 3);
    assert!(failed.output["stderr"].as_str().unwrap().contains("oops"));

    let unsupported = invoker
        .invoke(
            "execute_code",
            serde_json::json!({"code": "1", "language": "cobol"}),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(unsupported, ToolError::InvalidParameters(_)));
}

#[tokio::test]
async fn test_invoker_enforces_timeouts() {
    let protocol = CustomToolProtocol::new();
    protocol
        .register_async_tool(
            ToolMetadata::new("slow", "Sleeps"),
            Arc::new(|_| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(ToolResult::success(serde_json::json!("late")))
                })
            }),
        )
        .await;
    let mut registry = ToolRegistry::new();
    registry.discover(Arc::new(protocol)).await.unwrap();
    let invoker = ToolInvoker::new(Arc::new(registry), Duration::from_secs(10));

    let err = invoker
        .invoke("slow", serde_json::json!({}), Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    match err {
        ToolError::Timeout { tool, after } => {
            assert_eq!(tool, "slow");
            assert_eq!(after, Duration::from_millis(50));
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert!(invoker
        .invoke("nope", serde_json::json!({}), None)
        .await
        .unwrap_err()
        .to_string()
        .contains("nope"));
}
