use std::env::consts;

use log::debug;
use reqwest::Client;
use serde_json::json;
use url::Url;

use crate::error::{BuildEventsError, Result};
use crate::providers::REQUEST_TIMEOUT;

use super::{Event, HoneycombSettings};

/// Sends finished spans to Honeycomb, or prints them as JSON lines on
/// stdout when no API key is configured.
pub struct EventSink {
    client: Client,
    settings: HoneycombSettings,
    provider: Option<String>,
}

impl EventSink {
    pub fn new(settings: HoneycombSettings, provider: Option<String>) -> Result<Self> {
        let mut user_agent = format!("buildevents/{}", env!("CARGO_PKG_VERSION"));
        if let Some(provider) = &provider {
            user_agent.push_str(&format!(" ({provider})"));
        }

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BuildEventsError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            settings,
            provider,
        })
    }

    pub fn settings(&self) -> &HoneycombSettings {
        &self.settings
    }

    /// Starts an event stamped now, carrying the fields every span shares.
    pub fn new_event(&self, trace_id: &str) -> Event {
        let mut event = Event::new(chrono::Utc::now());
        if let Some(provider) = &self.provider {
            event.add_field("ci_provider", provider.as_str());
        }
        event.add_field("trace.trace_id", trace_id);
        event.add_field("meta.version", env!("CARGO_PKG_VERSION"));
        event.add_field("meta.os", consts::OS);
        event.add_field("meta.arch", consts::ARCH);
        event
    }

    pub async fn send(&self, event: &Event) -> Result<()> {
        let Some(api_key) = &self.settings.api_key else {
            let line = json!({
                "data": event.fields(),
                "time": event.timestamp().to_rfc3339(),
                "dataset": self.settings.dataset,
            });
            println!("{line}");
            return Ok(());
        };

        let url = self.events_url()?;
        let response = self
            .client
            .post(url)
            .header("X-Honeycomb-Team", api_key.as_str())
            .header("X-Honeycomb-Event-Time", event.timestamp().to_rfc3339())
            .json(event.fields())
            .send()
            .await?;

        let status = response.status();
        debug!("POST {} -> {status}", response.url());
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(BuildEventsError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }

    fn events_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.settings.api_host)
            .map_err(|e| BuildEventsError::Config(format!("Invalid API host: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| BuildEventsError::Config("API host cannot be a base".into()))?
            .pop_if_empty()
            .extend(["1", "events", self.settings.dataset.as_str()]);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Token;
    use chrono::TimeZone;
    use mockito::{Matcher, Server};

    fn settings(api_host: &str, api_key: Option<&str>) -> HoneycombSettings {
        HoneycombSettings {
            api_key: api_key.map(Token::from),
            api_host: api_host.to_string(),
            dataset: "ci-builds".to_string(),
        }
    }

    #[test]
    fn test_new_event_carries_shared_fields() {
        let sink = EventSink::new(
            settings("https://api.honeycomb.io", None),
            Some("CircleCI".to_string()),
        )
        .unwrap();
        let event = sink.new_event("trace-1");

        assert_eq!(event.field("trace.trace_id"), Some(&"trace-1".into()));
        assert_eq!(event.field("ci_provider"), Some(&"CircleCI".into()));
        assert_eq!(event.field("meta.os"), Some(&consts::OS.into()));
        assert!(event.field("meta.version").is_some());
    }

    #[test]
    fn test_no_provider_omits_field() {
        let sink = EventSink::new(settings("https://api.honeycomb.io", None), None).unwrap();
        assert!(sink.new_event("t").field("ci_provider").is_none());
    }

    #[tokio::test]
    async fn test_send_posts_to_dataset() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/1/events/ci-builds")
            .match_header("x-honeycomb-team", "key-123")
            .match_header("x-honeycomb-event-time", "2024-05-01T12:00:00+00:00")
            .match_body(Matcher::PartialJson(json!({
                "trace.trace_id": "trace-1",
                "status": "success",
            })))
            .with_status(200)
            .create_async()
            .await;

        let sink = EventSink::new(settings(&server.url(), Some("key-123")), None).unwrap();
        let mut event = sink.new_event("trace-1");
        event.add_field("status", "success");
        event.set_timestamp(chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());

        sink.send(&event).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_reports_rejection() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/1/events/ci-builds")
            .with_status(401)
            .with_body(r#"{"error":"unknown API key"}"#)
            .create_async()
            .await;

        let sink = EventSink::new(settings(&server.url(), Some("bad")), None).unwrap();
        let err = sink.send(&sink.new_event("t")).await.unwrap_err();

        assert!(matches!(err, BuildEventsError::ApiError { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_send_without_key_writes_locally() {
        let sink = EventSink::new(settings("http://127.0.0.1:9", None), None).unwrap();
        assert!(sink.send(&sink.new_event("t")).await.is_ok());
    }
}
