//! Engine availability probing.
//!
//! Log-line matching (see [`crate::engines::spec::EngineSpec`]) covers
//! processes this supervisor spawned; the HTTP probe covers engines already
//! running independently, where stdout is not ours to read. Both sit behind
//! a trait so call sites do not care which strategy applies.

use crate::defaults;
use async_trait::async_trait;
use std::time::Duration;

/// Strategy for deciding whether something is alive on an engine's port.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// True when a live process answers on the port.
    async fn is_alive(&self, port: u16) -> bool;
}

/// Short-timeout HTTP probe against a well-known local port.
///
/// Any response proves a server process exists, so 200 and 404 both count
/// as alive; only connection failures count as dead.
pub struct HttpProbe {
    client: reqwest::Client,
    path: String,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self::with_timeout(defaults::HEALTH_PROBE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            path: "/health".to_string(),
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    async fn is_alive(&self, port: u16) -> bool {
        let url = format!("http://127.0.0.1:{}{}", port, self.path);
        match self.client.get(&url).send().await {
            // Any status — 200, 404, even 500 — proves the port is served.
            Ok(_) => true,
            Err(_) => false,
        }
    }
}

/// Probe with a fixed answer, for tests.
pub struct FixedProbe {
    alive: bool,
}

impl FixedProbe {
    pub fn alive() -> Self {
        Self { alive: true }
    }

    pub fn dead() -> Self {
        Self { alive: false }
    }
}

#[async_trait]
impl ReadinessProbe for FixedProbe {
    async fn is_alive(&self, _port: u16) -> bool {
        self.alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_one_response(listener: TcpListener, status_line: &'static str) {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let response = format!("{}\r\ncontent-length: 0\r\n\r\n", status_line);
            let _ = stream.write_all(response.as_bytes()).await;
        }
    }

    #[tokio::test]
    async fn http_probe_treats_200_as_alive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve_one_response(listener, "HTTP/1.1 200 OK"));

        let probe = HttpProbe::new();
        assert!(probe.is_alive(port).await);
    }

    #[tokio::test]
    async fn http_probe_treats_404_as_alive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve_one_response(listener, "HTTP/1.1 404 Not Found"));

        let probe = HttpProbe::new();
        assert!(
            probe.is_alive(port).await,
            "404 still proves a live server"
        );
    }

    #[tokio::test]
    async fn http_probe_treats_refused_connection_as_dead() {
        // Bind and drop to get a port nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = HttpProbe::with_timeout(Duration::from_millis(500));
        assert!(!probe.is_alive(port).await);
    }

    #[tokio::test]
    async fn fixed_probe_answers_as_configured() {
        assert!(FixedProbe::alive().is_alive(1).await);
        assert!(!FixedProbe::dead().is_alive(1).await);
    }
}
