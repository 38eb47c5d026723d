use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use kvas_domains_core::config::FetchConfig;
use kvas_domains_core::contract::Fetcher;
use kvas_domains_core::fetch::HttpFetcher;

/// Serves a single canned HTTP response on a random local port.
async fn serve_once(status_line: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 2048];
        let _ = socket.read(&mut buf).await;
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });
    format!("http://{addr}/list.txt")
}

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(&FetchConfig {
        timeout_secs: 5,
        ..FetchConfig::default()
    })
    .expect("client builds")
}

#[tokio::test]
async fn returns_body_on_success() {
    let url = serve_once("200 OK", "example.com\nfull:api.example.com\n").await;
    let body = fetcher().fetch(&url).await.expect("fetch succeeds");
    assert_eq!(body, b"example.com\nfull:api.example.com\n");
}

#[tokio::test]
async fn non_success_status_is_an_http_error() {
    let url = serve_once("500 Internal Server Error", "").await;
    let err = fetcher().fetch(&url).await.unwrap_err();
    assert_eq!(err.status, Some(500));
    assert_eq!(err.message, "HTTP 500");
}

#[tokio::test]
async fn connection_refused_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = fetcher()
        .fetch(&format!("http://{addr}/list.txt"))
        .await
        .unwrap_err();
    assert_eq!(err.status, None);
    assert!(!err.message.is_empty());
}
