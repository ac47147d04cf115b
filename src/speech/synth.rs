//! Speech-synthesis client with engine fallback.
//!
//! Synthesis runs in a sidecar that plays audio itself; this client posts
//! the text and reports which engine served it. When the preferred engine
//! is unreachable the secondary is tried; when neither answers the caller
//! gets an actionable suggestion instead of a bare connection error.

use crate::bus::{BusEvent, EventBus};
use crate::config::SynthConfig;
use crate::defaults;
use crate::error::{Result, VocoachError};
use serde_json::json;
use std::time::Duration;

/// One synthesis sidecar endpoint.
#[derive(Debug, Clone)]
pub struct SynthEngine {
    pub name: String,
    pub base_url: String,
}

impl SynthEngine {
    pub fn new(name: &str, host: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            base_url: format!("http://{}:{}", host, port),
        }
    }
}

/// Client over an ordered list of synthesis engines, preferred first.
pub struct SynthClient {
    bus: EventBus,
    client: reqwest::Client,
    engines: Vec<SynthEngine>,
    voice: String,
    preset: String,
    timeout: Duration,
}

impl SynthClient {
    pub fn new(bus: EventBus, engines: Vec<SynthEngine>, config: &SynthConfig) -> Self {
        // Preferred engine first, everything else keeps its order.
        let mut engines = engines;
        engines.sort_by_key(|e| e.name != config.engine);
        Self {
            bus,
            client: reqwest::Client::new(),
            engines,
            voice: config.voice.clone(),
            preset: config.preset.clone(),
            timeout: defaults::SYNTHESIS_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Speak `text`, returning the name of the engine that served it.
    ///
    /// Publishes `SpeechStarted` before playback and always publishes
    /// `SpeechEnded` afterwards, even on failure, so wake suppression and
    /// barge-in monitoring never stay stuck on.
    pub async fn speak(&self, text: &str) -> Result<String> {
        self.bus.publish(BusEvent::SpeechStarted);
        let result = self.speak_inner(text).await;
        self.bus.publish(BusEvent::SpeechEnded);
        result
    }

    async fn speak_inner(&self, text: &str) -> Result<String> {
        let body = json!({
            "text": text,
            "voice": self.voice,
            "preset": self.preset,
        });

        for engine in &self.engines {
            let response = self
                .client
                .post(format!("{}/synthesize", engine.base_url))
                .json(&body)
                .timeout(self.timeout)
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => {
                    return Ok(engine.name.clone());
                }
                Ok(response) => {
                    // The engine is alive but rejected the request; a
                    // different engine will not do better with it.
                    return Err(VocoachError::Synthesis {
                        message: format!("{} returned {}", engine.name, response.status()),
                    });
                }
                Err(e) => {
                    tracing::debug!(engine = %engine.name, "unreachable, trying next: {}", e);
                }
            }
        }

        Err(VocoachError::SynthesisUnavailable {
            suggestion: self.install_suggestion(),
        })
    }

    /// True when any engine answers its health endpoint. 404 counts: an
    /// engine without a health route is still serving.
    pub async fn is_available(&self) -> bool {
        for engine in &self.engines {
            let response = self
                .client
                .get(format!("{}/health", engine.base_url))
                .timeout(defaults::HEALTH_PROBE_TIMEOUT)
                .send()
                .await;
            if response.is_ok() {
                return true;
            }
        }
        false
    }

    fn install_suggestion(&self) -> String {
        let names: Vec<&str> = self.engines.iter().map(|e| e.name.as_str()).collect();
        format!(
            "no synthesis engine is running; install or start one of: {}",
            names.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Topic;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `responses` canned HTTP responses on a fresh port, one per
    /// connection, after draining the request headers.
    async fn fake_http_server(responses: Vec<&'static str>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            for response in responses {
                let Ok((mut conn, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = vec![0u8; 4096];
                let _ = conn.read(&mut buf).await;
                let _ = conn.write_all(response.as_bytes()).await;
                let _ = conn.shutdown().await;
            }
        });
        port
    }

    const OK: &str = "HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok";
    const SERVER_ERROR: &str =
        "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";

    fn engines_for(primary_port: u16, fallback_port: u16) -> Vec<SynthEngine> {
        vec![
            SynthEngine::new("soprano", "127.0.0.1", primary_port),
            SynthEngine::new("espeak-server", "127.0.0.1", fallback_port),
        ]
    }

    async fn dead_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn preferred_engine_serves_when_alive() {
        let primary = fake_http_server(vec![OK]).await;
        let fallback = dead_port().await;
        let client = SynthClient::new(
            EventBus::new(),
            engines_for(primary, fallback),
            &SynthConfig::default(),
        );

        let served = client.speak("hello there").await.unwrap();
        assert_eq!(served, "soprano");
    }

    #[tokio::test]
    async fn unreachable_preferred_falls_back() {
        let primary = dead_port().await;
        let fallback = fake_http_server(vec![OK]).await;
        let client = SynthClient::new(
            EventBus::new(),
            engines_for(primary, fallback),
            &SynthConfig::default(),
        );

        let served = client.speak("hello there").await.unwrap();
        assert_eq!(served, "espeak-server");
    }

    #[tokio::test]
    async fn no_engine_alive_reports_actionable_suggestion() {
        let client = SynthClient::new(
            EventBus::new(),
            engines_for(dead_port().await, dead_port().await),
            &SynthConfig::default(),
        );

        let err = client.speak("hello").await.unwrap_err();
        match err {
            VocoachError::SynthesisUnavailable { suggestion } => {
                assert!(suggestion.contains("soprano"));
                assert!(suggestion.contains("espeak-server"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn http_error_from_a_live_engine_does_not_fall_back() {
        let primary = fake_http_server(vec![SERVER_ERROR]).await;
        let fallback = fake_http_server(vec![OK]).await;
        let client = SynthClient::new(
            EventBus::new(),
            engines_for(primary, fallback),
            &SynthConfig::default(),
        )
        .with_timeout(Duration::from_secs(2));

        let err = client.speak("hello").await.unwrap_err();
        assert!(matches!(err, VocoachError::Synthesis { .. }));
    }

    #[tokio::test]
    async fn speech_events_bracket_playback_even_on_failure() {
        let bus = EventBus::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let started = bus.subscribe(Topic::SpeechStarted, move |_| {
            sink.lock().unwrap().push("started");
        });
        let sink = Arc::clone(&events);
        let ended = bus.subscribe(Topic::SpeechEnded, move |_| {
            sink.lock().unwrap().push("ended");
        });

        let client = SynthClient::new(
            bus.clone(),
            engines_for(dead_port().await, dead_port().await),
            &SynthConfig::default(),
        );
        let _ = client.speak("hello").await;

        assert_eq!(*events.lock().unwrap(), vec!["started", "ended"]);
        started.unsubscribe();
        ended.unsubscribe();
    }

    #[tokio::test]
    async fn preferred_engine_from_config_is_tried_first() {
        let config = SynthConfig {
            engine: "espeak-server".to_string(),
            ..SynthConfig::default()
        };
        let primary = fake_http_server(vec![OK]).await;
        // "soprano" would also answer, but the configured preference wins.
        let soprano = fake_http_server(vec![OK]).await;
        let client = SynthClient::new(EventBus::new(), engines_for(soprano, primary), &config);

        let served = client.speak("hi").await.unwrap();
        assert_eq!(served, "espeak-server");
    }
}
