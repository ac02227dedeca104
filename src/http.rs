use crate::fetch::Fetch;
use anyhow::Context;
use std::ops::Deref;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A wrapper for re-using the reqwest client. Resource keys are treated as URLs.
#[derive(Debug, Clone)]
pub struct HttpClient(reqwest::Client);

impl Default for HttpClient {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT).expect("Fail to build req client")
    }
}

impl Deref for HttpClient {
    type Target = reqwest::Client;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| "fail to build http client")?;
        Ok(Self(client))
    }

    #[inline]
    pub fn inner(&self) -> &reqwest::Client {
        &self.0
    }
}

#[async_trait::async_trait]
impl Fetch for HttpClient {
    /// GET the URL and return the raw body. Any non-2xx status is a failure.
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let body = self
            .get(url)
            .send()
            .await
            .with_context(|| format!("fail to send GET request to url: `{url}`"))?
            .error_for_status()
            .with_context(|| format!("url `{url}` responded with an error status"))?
            .bytes()
            .await
            .with_context(|| format!("fail to read response body from url: `{url}`"))?;

        Ok(body.to_vec())
    }
}

#[tokio::test]
async fn test_invalid_url_is_a_fetch_error() {
    let client = HttpClient::new();
    let err = client.fetch("not a url").await.unwrap_err();
    assert!(err.to_string().contains("not a url"));
}

#[tokio::test]
async fn test_error_status_is_a_fetch_error() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf).await;
        stream
            .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
    });

    let client = HttpClient::new();
    let err = client
        .fetch(&format!("http://{addr}/page"))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("503"));
}

#[tokio::test]
async fn test_fetch_returns_body() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf).await;
        stream
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\nconnection: close\r\n\r\nhello")
            .await
            .unwrap();
    });

    let client = HttpClient::new();
    let body = client.fetch(&format!("http://{addr}/")).await.unwrap();
    assert_eq!(body, b"hello");
}
