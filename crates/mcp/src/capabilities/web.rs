// Web tools for fetching external content

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use waypost_core::{Arguments, Capability, CapabilityError, CapabilityHandler, ParamType, ParameterSpec};

/// Settings for `fetch_webpage`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Hard wall-clock bound on one fetch, including the body
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Characters of body returned to the caller
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_chars() -> usize {
    10_000
}

fn default_user_agent() -> String {
    format!("waypost/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_chars: default_max_chars(),
            user_agent: default_user_agent(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Tool to fetch content from web URLs
pub struct FetchWebpageTool {
    client: reqwest::Client,
    timeout: Duration,
    max_chars: usize,
}

impl FetchWebpageTool {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        Self::with_timeout(config, config.timeout())
    }

    /// Build with an explicit timeout instead of the configured whole seconds
    pub fn with_timeout(config: &FetchConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            timeout,
            max_chars: config.max_chars,
        })
    }

    pub fn capability(config: &FetchConfig) -> Result<Capability> {
        Ok(Self::into_capability(Self::new(config)?))
    }

    pub fn into_capability(self) -> Capability {
        Capability::tool("fetch_webpage", "Fetch content from a webpage.", Arc::new(self)).with_param(
            ParameterSpec::required("url", ParamType::String)
                .with_description("The URL to fetch (must start with http:// or https://)"),
        )
    }

    async fn fetch(&self, url: Url) -> Result<String, CapabilityError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(&e))?;

        let response = response.error_for_status().map_err(|e| fetch_error(&e))?;
        let body = response.text().await.map_err(|e| fetch_error(&e))?;

        Ok(body.chars().take(self.max_chars).collect())
    }
}

/// Map a client error to a short description that leaks no internal detail
fn fetch_error(err: &reqwest::Error) -> CapabilityError {
    tracing::debug!("Fetch failed: {:?}", err);

    let reason = if err.is_timeout() {
        "request timed out".to_string()
    } else if let Some(status) = err.status() {
        format!("HTTP status {}", status)
    } else if err.is_redirect() {
        "too many redirects".to_string()
    } else if err.is_connect() {
        "could not connect to host".to_string()
    } else if err.is_body() || err.is_decode() {
        "could not read response body".to_string()
    } else {
        "request failed".to_string()
    };

    CapabilityError::HandlerFailure(format!("Error fetching page: {}", reason))
}

#[async_trait]
impl CapabilityHandler for FetchWebpageTool {
    async fn invoke(&self, arguments: Arguments) -> Result<String, CapabilityError> {
        let url = arguments
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CapabilityError::validation("url", "missing required argument"))?;

        tracing::info!("Fetching content from {}", url);

        // Only allow HTTP/HTTPS
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CapabilityError::handler("URL must start with http:// or https://"));
        }

        let url = Url::parse(url).map_err(|e| CapabilityError::handler(format!("Invalid URL: {}", e)))?;

        match tokio::time::timeout(self.timeout, self.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::handler(format!(
                "Error fetching page: request timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn args(url: &str) -> Arguments {
        json!({ "url": url }).as_object().cloned().unwrap()
    }

    /// Serve canned HTTP responses; `/redirect` points at `/final`
    async fn spawn_stub_server(body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();

                    let response = if request.starts_with("GET /redirect ") {
                        format!(
                            "HTTP/1.1 302 Found\r\nLocation: http://{}/final\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                            addr
                        )
                    } else if request.starts_with("GET /missing ") {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    } else {
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    };
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}", addr)
    }

    /// Accept connections and never answer
    async fn spawn_silent_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_rejects_non_http_scheme() {
        let tool = FetchWebpageTool::new(&FetchConfig::default()).unwrap();
        let err = tool.invoke(args("ftp://x")).await.unwrap_err();
        assert_eq!(
            err,
            CapabilityError::handler("URL must start with http:// or https://")
        );
    }

    #[tokio::test]
    async fn test_fetch_truncates_body() {
        let base = spawn_stub_server("a".repeat(20_000)).await;
        let tool = FetchWebpageTool::new(&FetchConfig::default()).unwrap();

        let body = tool.invoke(args(&format!("{}/page", base))).await.unwrap();
        assert_eq!(body.chars().count(), 10_000);
    }

    #[tokio::test]
    async fn test_fetch_follows_redirects() {
        let base = spawn_stub_server("landed".to_string()).await;
        let tool = FetchWebpageTool::new(&FetchConfig::default()).unwrap();

        let body = tool.invoke(args(&format!("{}/redirect", base))).await.unwrap();
        assert_eq!(body, "landed");
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let base = spawn_stub_server(String::new()).await;
        let tool = FetchWebpageTool::new(&FetchConfig::default()).unwrap();

        let err = tool.invoke(args(&format!("{}/missing", base))).await.unwrap_err();
        assert_eq!(
            err,
            CapabilityError::handler("Error fetching page: HTTP status 404 Not Found")
        );
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let base = spawn_silent_server().await;
        let tool =
            FetchWebpageTool::with_timeout(&FetchConfig::default(), Duration::from_millis(200)).unwrap();

        let started = std::time::Instant::now();
        let err = tool.invoke(args(&base)).await.unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
