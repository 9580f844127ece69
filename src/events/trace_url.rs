use chrono::{Duration, Utc};
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::{BuildEventsError, Result};
use crate::providers::fetch_json;

use super::HoneycombSettings;

#[derive(Debug, Deserialize)]
struct AuthInfo {
    team: Slug,
    #[serde(default)]
    environment: Option<Slug>,
}

#[derive(Debug, Deserialize)]
struct Slug {
    slug: String,
}

/// Builds links to a trace in the Honeycomb UI.
pub struct TraceUrlBuilder {
    client: Client,
    settings: HoneycombSettings,
}

impl TraceUrlBuilder {
    pub fn new(settings: HoneycombSettings) -> Result<Self> {
        Ok(Self {
            client: crate::providers::http_client()?,
            settings,
        })
    }

    /// Looks up the team (and environment) owning the API key, then links to
    /// `trace_id` starting at `start_ts` (Unix seconds).
    pub async fn build(&self, trace_id: &str, start_ts: i64) -> Result<String> {
        let auth = self.fetch_auth().await?;
        let environment = auth.environment.map(|env| env.slug);
        debug!(
            "API key belongs to team {} (environment {:?})",
            auth.team.slug, environment
        );
        trace_link(
            &self.settings,
            &auth.team.slug,
            environment.as_deref(),
            trace_id,
            start_ts,
        )
    }

    async fn fetch_auth(&self) -> Result<AuthInfo> {
        let api_key = self
            .settings
            .api_key
            .as_ref()
            .filter(|key| !key.is_empty())
            .ok_or(BuildEventsError::MissingCredential {
                provider: "Honeycomb",
            })?;

        let url = Url::parse(&self.settings.api_host)
            .and_then(|host| host.join("/1/auth"))
            .map_err(|e| BuildEventsError::Config(format!("Invalid API host: {e}")))?;

        fetch_json(
            self.client
                .get(url)
                .header("X-Honeycomb-Team", api_key.as_str()),
            "API key",
        )
        .await
    }
}

fn trace_link(
    settings: &HoneycombSettings,
    team: &str,
    environment: Option<&str>,
    trace_id: &str,
    start_ts: i64,
) -> Result<String> {
    let ui_host = settings.api_host.replacen("api", "ui", 1);
    let mut url = Url::parse(&ui_host)
        .map_err(|_| BuildEventsError::Config(format!("unable to infer UI host: {ui_host}")))?;

    let mut segments = vec![team.to_string()];
    if !settings.is_classic() {
        segments.push("environments".to_string());
        segments.push(environment.unwrap_or_default().to_string());
    }
    segments.extend([
        "datasets".to_string(),
        slugify(&settings.dataset),
        "trace".to_string(),
    ]);

    url.path_segments_mut()
        .map_err(|()| BuildEventsError::Config(format!("unable to infer UI host: {ui_host}")))?
        .clear()
        .extend(&segments);

    let end_ts = (Utc::now() + Duration::minutes(10)).timestamp();
    url.query_pairs_mut()
        .clear()
        .append_pair("trace_id", trace_id)
        .append_pair("trace_start_ts", &start_ts.to_string())
        .append_pair("trace_end_ts", &end_ts.to_string());

    Ok(url.to_string())
}

/// Lowercases and replaces anything outside `[a-z0-9_~.-]` with `-`.
/// Already-slugged names are unchanged.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' | '~' | '.' | '-' => c,
            _ => '-',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Token;
    use mockito::Server;

    const CLASSIC: &str = "0123456789abcdef0123456789abcdef";

    fn settings(api_host: &str, api_key: &str, dataset: &str) -> HoneycombSettings {
        HoneycombSettings {
            api_key: Some(Token::from(api_key)),
            api_host: api_host.to_string(),
            dataset: dataset.to_string(),
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("My Service!"), "my-service-");
        assert_eq!(slugify("ci_builds.v2~x"), "ci_builds.v2~x");
        assert_eq!(slugify(&slugify("Über Builds")), slugify("Über Builds"));
    }

    #[test]
    fn test_trace_link_for_environment_key() {
        let settings = settings("https://api.honeycomb.io", "env-key", "Build Events");
        let link = trace_link(&settings, "acme", Some("prod"), "t-1", 1700000000).unwrap();

        assert!(link.starts_with(
            "https://ui.honeycomb.io/acme/environments/prod/datasets/build-events/trace?trace_id=t-1&trace_start_ts=1700000000&trace_end_ts="
        ));
    }

    #[test]
    fn test_trace_link_for_classic_key() {
        let settings = settings("https://api.honeycomb.io", CLASSIC, "buildevents");
        let link = trace_link(&settings, "acme", Some("ignored"), "t-1", 1).unwrap();

        assert!(link.starts_with("https://ui.honeycomb.io/acme/datasets/buildevents/trace?"));
    }

    #[test]
    fn test_trace_end_is_ten_minutes_out() {
        let settings = settings("https://api.honeycomb.io", CLASSIC, "buildevents");
        let link = trace_link(&settings, "acme", None, "t-1", 1).unwrap();
        let url = Url::parse(&link).unwrap();
        let end: i64 = url
            .query_pairs()
            .find(|(k, _)| k == "trace_end_ts")
            .map(|(_, v)| v.parse().unwrap())
            .unwrap();

        let expected = (Utc::now() + Duration::minutes(10)).timestamp();
        assert!((expected - end).abs() <= 5);
    }

    #[tokio::test]
    async fn test_build_resolves_team_and_environment() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/1/auth")
            .match_header("x-honeycomb-team", "env-key")
            .with_status(200)
            .with_body(r#"{"team":{"slug":"acme"},"environment":{"slug":"staging"}}"#)
            .create_async()
            .await;

        let builder = TraceUrlBuilder::new(settings(&server.url(), "env-key", "web")).unwrap();
        let link = builder.build("trace-9", 1700000000).await.unwrap();

        mock.assert_async().await;
        assert!(link.contains("/acme/environments/staging/datasets/web/trace?trace_id=trace-9"));
    }

    #[tokio::test]
    async fn test_build_fails_for_rejected_key() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/1/auth")
            .with_status(401)
            .create_async()
            .await;

        let builder = TraceUrlBuilder::new(settings(&server.url(), "bad", "web")).unwrap();
        assert!(builder.build("trace-9", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_build_requires_key() {
        let settings = HoneycombSettings {
            api_key: None,
            api_host: "https://api.honeycomb.io".to_string(),
            dataset: "web".to_string(),
        };
        let builder = TraceUrlBuilder::new(settings).unwrap();
        let err = builder.build("trace-9", 1).await.unwrap_err();

        assert!(matches!(err, BuildEventsError::MissingCredential { .. }));
    }
}
