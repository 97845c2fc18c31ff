//! Integration tests for the fetcher
//!
//! These tests use wiremock to create mock HTTP servers and drive the full
//! acquire, send, adapt and retry cycle end-to-end.

use std::time::{Duration, Instant};
use sumi_fetch::config::{Config, FetcherConfig, UserAgentConfig};
use sumi_fetch::{BatchDispatcher, FetchError, Fetcher, KeyStrategy, RequestOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration around the given fetcher settings
fn create_test_config(fetcher: FetcherConfig) -> Config {
    Config {
        fetcher,
        batch: Default::default(),
        user_agent: UserAgentConfig {
            client_name: "TestClient".to_string(),
            client_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        auth: Default::default(),
    }
}

/// Serves a single raw HTTP response on a local port and returns its URL
async fn serve_raw_once(response: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to read local address");

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("Failed to accept");
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.expect("Failed to read request");
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        socket
            .write_all(response)
            .await
            .expect("Failed to write response");
        let _ = socket.shutdown().await;
    });

    format!("http://{}/raw", addr)
}

fn create_test_fetcher() -> Fetcher {
    Fetcher::new(&create_test_config(FetcherConfig::default())).expect("Failed to build fetcher")
}

#[tokio::test]
async fn test_fetch_one_sends_api_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/account"))
        .and(header("x-api-key", "secret"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = create_test_fetcher();
    let cancel = CancellationToken::new();
    let url = format!("{}/account", mock_server.uri());

    let body = fetcher
        .fetch_one(&url, Some("secret"), 5.0, &cancel)
        .await
        .expect("Fetch should succeed");

    assert_eq!(body, br#"{"ok":true}"#.to_vec());

    let snapshot = fetcher.registry().snapshot(&url).expect("Key should be tracked");
    assert_eq!(snapshot.total_requests, 1);
    assert_eq!(snapshot.throttle_hits, 0);
    assert_eq!(snapshot.backoff, Duration::from_secs(1));
}

#[tokio::test]
async fn test_fetch_with_query_and_bearer() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(query_param("owner", "0xabc"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = create_test_fetcher();
    let cancel = CancellationToken::new();
    let options = RequestOptions::new()
        .bearer_token("tok")
        .query("owner", "0xabc");

    let body = fetcher
        .fetch_with(&format!("{}/orders", mock_server.uri()), &options, 5.0, &cancel)
        .await
        .expect("Fetch should succeed");

    assert_eq!(body, b"[]".to_vec());
}

#[tokio::test]
async fn test_throttled_then_retry_after_then_success() {
    let mock_server = MockServer::start().await;

    // First request is throttled, later ones succeed
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_string("payload"))
        .mount(&mock_server)
        .await;

    let fetcher = create_test_fetcher();
    let cancel = CancellationToken::new();
    let url = format!("{}/data", mock_server.uri());

    let started = Instant::now();
    let body = fetcher
        .fetch_one(&url, None, 4.0, &cancel)
        .await
        .expect("Fetch should succeed after retry");

    assert_eq!(body, b"payload".to_vec());
    assert!(started.elapsed() >= Duration::from_secs(1));

    let snapshot = fetcher.registry().snapshot(&url).unwrap();
    assert_eq!(snapshot.throttle_hits, 1);
    assert_eq!(snapshot.total_requests, 2);
    assert!((snapshot.rate_per_sec - 3.0).abs() < 1e-9);
    assert_eq!(snapshot.backoff, Duration::from_secs(1));
}

#[tokio::test]
async fn test_cancellation_interrupts_throttle_backoff() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = create_test_fetcher();
    let cancel = CancellationToken::new();
    let url = format!("{}/throttled", mock_server.uri());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = fetcher.fetch_one(&url, None, 5.0, &cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(5));

    let snapshot = fetcher.registry().snapshot(&url).unwrap();
    assert_eq!(snapshot.throttle_hits, 1);
    assert_eq!(snapshot.backoff, Duration::from_secs(30));
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::new(&create_test_config(FetcherConfig {
        max_attempts: 2,
        ..FetcherConfig::default()
    }))
    .unwrap();
    let cancel = CancellationToken::new();

    let err = fetcher
        .fetch_one(&format!("{}/busy", mock_server.uri()), None, 5.0, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Throttled { attempts: 2, .. }));
}

#[tokio::test]
async fn test_rate_limit_headers_steer_rate() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("ok")
                .insert_header("X-RateLimit-Limit", "100")
                .insert_header("X-RateLimit-Reset", "60"),
        )
        .mount(&mock_server)
        .await;

    let fetcher = create_test_fetcher();
    let cancel = CancellationToken::new();
    let slow = format!("{}/slow", mock_server.uri());
    let fast = format!("{}/fast", mock_server.uri());

    fetcher.fetch_one(&slow, None, 1.0, &cancel).await.unwrap();
    fetcher.fetch_one(&fast, None, 5.0, &cancel).await.unwrap();

    // 80% of 100 per 60s is ~1.33 req/s; upward moves are capped at 10%
    let slow_rate = fetcher.registry().snapshot(&slow).unwrap().rate_per_sec;
    assert!((slow_rate - 1.1).abs() < 1e-9);

    let fast_rate = fetcher.registry().snapshot(&fast).unwrap().rate_per_sec;
    assert!((fast_rate - 100.0 / 60.0 * 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn test_empty_body_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let fetcher = create_test_fetcher();
    let cancel = CancellationToken::new();
    let url = format!("{}/empty", mock_server.uri());

    let err = fetcher.fetch_one(&url, None, 5.0, &cancel).await.unwrap_err();

    assert!(matches!(err, FetchError::EmptyBody { .. }));
    assert_eq!(err.url(), url);
    assert_eq!(fetcher.registry().snapshot(&url).unwrap().rate_per_sec, 5.0);
}

#[tokio::test]
async fn test_chunked_empty_body_is_an_error() {
    // No Content-Length, so emptiness is only known once the body is read
    let url = serve_raw_once(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n0\r\n\r\n",
    )
    .await;

    let fetcher = create_test_fetcher();
    let cancel = CancellationToken::new();

    let err = fetcher.fetch_one(&url, None, 5.0, &cancel).await.unwrap_err();

    assert!(matches!(err, FetchError::EmptyBody { .. }));
    let snapshot = fetcher.registry().snapshot(&url).unwrap();
    assert_eq!(snapshot.rate_per_sec, 5.0);
    assert_eq!(snapshot.total_requests, 1);
}

#[tokio::test]
async fn test_unexpected_status_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = create_test_fetcher();
    let cancel = CancellationToken::new();
    let url = format!("{}/down", mock_server.uri());

    let err = fetcher.fetch_one(&url, None, 5.0, &cancel).await.unwrap_err();

    assert!(matches!(err, FetchError::UnexpectedStatus { status: 503, .. }));
    assert_eq!(fetcher.registry().snapshot(&url).unwrap().rate_per_sec, 5.0);
}

#[tokio::test]
async fn test_response_size_limit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 1024]))
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::new(&create_test_config(FetcherConfig {
        max_response_bytes: 100,
        ..FetcherConfig::default()
    }))
    .unwrap();
    let cancel = CancellationToken::new();

    let err = fetcher
        .fetch_one(&format!("{}/big", mock_server.uri()), None, 5.0, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::ResponseTooLarge { limit: 100, .. }));
}

#[tokio::test]
async fn test_transport_failure_halves_rate() {
    let fetcher = create_test_fetcher();
    let cancel = CancellationToken::new();
    let url = "http://127.0.0.1:1/unreachable";

    let err = fetcher.fetch_one(url, None, 4.0, &cancel).await.unwrap_err();

    assert!(matches!(err, FetchError::Transport { .. }));
    assert_eq!(fetcher.registry().snapshot(url).unwrap().rate_per_sec, 2.0);
}

#[tokio::test]
async fn test_batch_omits_failed_urls() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string("A"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200).set_body_string("B"))
        .mount(&mock_server)
        .await;

    let dispatcher = BatchDispatcher::new(create_test_fetcher());
    let cancel = CancellationToken::new();
    let a = format!("{}/a", mock_server.uri());
    let b = format!("{}/b", mock_server.uri());
    let unreachable = "http://127.0.0.1:1/c".to_string();
    let urls = vec![a.clone(), b.clone(), unreachable.clone()];

    let bodies = dispatcher.fetch_batch(&urls, Some("key"), 5.0, &cancel).await;

    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[&a], b"A".to_vec());
    assert_eq!(bodies[&b], b"B".to_vec());
    assert!(!bodies.contains_key(&unreachable));

    let outcome = dispatcher
        .fetch_batch_detailed(&urls, Some("key"), 5.0, &cancel)
        .await;
    assert_eq!(outcome.successes.len(), 2);
    assert!(matches!(
        outcome.failures.get(&unreachable),
        Some(FetchError::Transport { .. })
    ));
}

#[tokio::test]
async fn test_batch_shares_host_bucket() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let fetcher = Fetcher::new(&create_test_config(FetcherConfig {
        key_strategy: KeyStrategy::Host,
        ..FetcherConfig::default()
    }))
    .unwrap();
    let dispatcher = BatchDispatcher::new(fetcher).with_max_in_flight(2);
    let cancel = CancellationToken::new();
    let urls: Vec<String> = ["/x", "/y", "/z"]
        .iter()
        .map(|p| format!("{}{}", mock_server.uri(), p))
        .collect();

    let bodies = dispatcher.fetch_batch(&urls, None, 20.0, &cancel).await;

    assert_eq!(bodies.len(), 3);
    assert_eq!(dispatcher.fetcher().registry().len(), 1);
}

#[tokio::test]
async fn test_cancellation_interrupts_in_flight_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&mock_server)
        .await;

    let fetcher = create_test_fetcher();
    let cancel = CancellationToken::new();
    let url = format!("{}/slow", mock_server.uri());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = fetcher.fetch_one(&url, None, 5.0, &cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_sustained_throughput_is_bounded_by_rate() {
    let mock_server = MockServer::start().await;

    // A modest Remaining keeps the controller from adjusting the rate
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("ok")
                .insert_header("X-RateLimit-Remaining", "50"),
        )
        .expect(5)
        .mount(&mock_server)
        .await;

    let fetcher = create_test_fetcher();
    let cancel = CancellationToken::new();
    let url = format!("{}/paced", mock_server.uri());

    let started = Instant::now();
    for _ in 0..5 {
        fetcher.fetch_one(&url, None, 10.0, &cancel).await.unwrap();
    }

    // 5 requests at 10 req/s need at least 4 refill intervals of 100ms
    assert!(started.elapsed() >= Duration::from_millis(395));
    assert_eq!(fetcher.registry().snapshot(&url).unwrap().rate_per_sec, 10.0);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_rate() {
    let mock_server = MockServer::start().await;

    // A small Remaining keeps the controller from adjusting the rate
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("ok")
                .insert_header("X-RateLimit-Remaining", "1"),
        )
        .expect(6)
        .mount(&mock_server)
        .await;

    let dispatcher = BatchDispatcher::new(create_test_fetcher());
    let cancel = CancellationToken::new();
    let url = format!("{}/shared", mock_server.uri());
    let urls = vec![url.clone(); 6];

    let started = Instant::now();
    let outcome = dispatcher.fetch_batch_detailed(&urls, None, 5.0, &cancel).await;

    // 6 requests at 5 req/s need at least 5 refill intervals of 200ms
    assert!(started.elapsed() >= Duration::from_millis(995));
    assert_eq!(outcome.successes.len(), 1);
    assert!(outcome.failures.is_empty());

    let snapshot = dispatcher.fetcher().registry().snapshot(&url).unwrap();
    assert_eq!(snapshot.total_requests, 6);
    assert_eq!(snapshot.rate_per_sec, 5.0);
}
