use anyhow::{bail, ensure, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::Token;
use crate::config::Config;
use crate::events::{
    add_fields_from_file, add_provider_fields, resolve_dataset, Event, EventSink,
    HoneycombSettings, ProcessEnv, ProviderKind, TraceUrlBuilder,
};
use crate::output::{self, bright_red, warn_user};
use crate::providers::{BuildLocator, BuildkiteClient, CircleCiClient, ProviderApi};
use crate::runner::{quote_command, run_command};
use crate::watch::{WatchConfig, WatchOutcome, Watcher};

#[derive(Parser)]
#[command(name = "buildevents")]
#[command(
    author,
    version,
    about = "Creates Honeycomb events and tracing information about your CI builds",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Honeycomb API key; events are printed to stdout when unset
    #[arg(short = 'k', long, global = true, env = "BUILDEVENT_APIKEY", hide_env_values = true)]
    apikey: Option<String>,

    /// Honeycomb dataset (deprecated for environment keys, use --service-name)
    #[arg(short, long, global = true, env = "BUILDEVENT_DATASET")]
    dataset: Option<String>,

    /// Service to send events to; overrides --dataset
    #[arg(
        short = 'n',
        long = "service-name",
        alias = "service_name",
        global = true,
        env = "BUILDEVENT_SERVICE_NAME"
    )]
    service_name: Option<String>,

    /// Honeycomb API host
    #[arg(short = 'a', long, global = true, env = "BUILDEVENT_APIHOST")]
    apihost: Option<String>,

    /// logfmt file of extra fields to add to each span
    #[arg(short, long, global = true, env = "BUILDEVENT_FILE")]
    filename: Option<PathBuf>,

    /// CI provider name; detected from the environment when unset
    #[arg(short, long, global = true, env = "BUILDEVENT_CIPROVIDER")]
    provider: Option<String>,

    /// Suppress warnings
    #[arg(short, long, global = true, default_value_t = false)]
    quiet: bool,

    /// Config file (defaults to ./buildevents.{toml,json,yaml,yml})
    #[arg(long, global = true, env = "BUILDEVENT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send the root span for the whole build; prints a link to the trace
    Build {
        trace_id: String,
        /// Build start, Unix seconds
        start: String,
        #[arg(value_parser = ["success", "failure"])]
        outcome: String,
    },
    /// Send a span for one step of the build
    Step {
        trace_id: String,
        step_id: String,
        /// Step start, Unix seconds
        start: String,
        name: String,
    },
    /// Run a shell command and send a span for it
    Cmd {
        trace_id: String,
        step_id: String,
        name: String,
        /// Command to run, after `--`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Poll CircleCI until every job in the workflow has finished
    Watch(WatchArgs),
    /// Poll Buildkite until every job in the build has finished
    #[command(name = "bk_watch")]
    BkWatch(BkWatchArgs),
}

#[derive(Args)]
struct WatchArgs {
    build_id: String,

    /// Minutes to wait before giving up
    #[arg(short, long, env = "BUILDEVENT_TIMEOUT")]
    timeout: Option<u64>,

    /// CircleCI API token
    #[arg(short = 'c', long, env = "BUILDEVENT_CIRCLE_API_TOKEN", hide_env_values = true)]
    circlekey: Option<String>,

    /// CircleCI workflow to watch
    #[arg(short, long, env = "CIRCLE_WORKFLOW_ID")]
    workflowid: Option<String>,

    /// Name of the job running the watch, ignored while polling
    #[arg(short, long, env = "CIRCLE_JOB")]
    jobname: Option<String>,

    /// Quiet polls required before trusting a finished verdict
    #[arg(long)]
    checks: Option<u32>,
}

#[derive(Args)]
struct BkWatchArgs {
    build_id: String,

    /// Minutes to wait before giving up
    #[arg(short, long, env = "BUILDEVENT_TIMEOUT")]
    timeout: Option<u64>,

    /// Buildkite API token
    #[arg(long, env = "BUILDEVENT_BUILDKITE_API_TOKEN", hide_env_values = true)]
    apitoken: Option<String>,

    #[arg(long, env = "BUILDKITE_ORGANIZATION_SLUG")]
    org: Option<String>,

    #[arg(long, env = "BUILDKITE_PIPELINE_SLUG")]
    pipeline: Option<String>,

    #[arg(long, env = "BUILDKITE_BUILD_NUMBER")]
    buildnum: Option<String>,

    /// Id of the job running the watch, ignored while polling
    #[arg(long, env = "BUILDKITE_JOB_ID")]
    jobid: Option<String>,

    /// Quiet polls required before trusting a finished verdict
    #[arg(long)]
    checks: Option<u32>,
}

/// Resolved settings and collaborators shared by every command.
struct Session {
    config: Config,
    provider: Option<String>,
    sink: EventSink,
    trace_urls: TraceUrlBuilder,
}

impl Session {
    fn provider_kind(&self) -> Option<ProviderKind> {
        self.provider.as_deref().and_then(ProviderKind::parse)
    }

    fn settings(&self) -> &HoneycombSettings {
        self.sink.settings()
    }

    /// `service_name` for a span: the command name for classic keys, the
    /// dataset otherwise.
    fn service_name<'a>(&'a self, command: &'a str) -> &'a str {
        self.settings().if_classic(command, &self.settings().dataset)
    }
}

impl Cli {
    fn session(&self, config: Config) -> Result<Session> {
        let api_key = self
            .apikey
            .clone()
            .or_else(|| config.honeycomb.api_key.clone())
            .map(Token::from)
            .filter(|key| !key.is_empty());
        let api_host = self
            .apihost
            .clone()
            .unwrap_or_else(|| config.honeycomb.api_host.clone());

        let (dataset, warnings) = resolve_dataset(
            api_key.as_ref(),
            self.dataset
                .as_deref()
                .or(config.honeycomb.dataset.as_deref()),
            self.service_name
                .as_deref()
                .or(config.honeycomb.service_name.as_deref()),
        );
        for warning in warnings {
            warn_user(self.quiet, warning);
        }

        let provider = self
            .provider
            .clone()
            .filter(|p| !p.trim().is_empty())
            .or_else(|| ProviderKind::detect(&ProcessEnv).map(|kind| kind.as_str().to_string()));
        info!("Sending to dataset {dataset} (provider: {provider:?})");

        let settings = HoneycombSettings {
            api_key,
            api_host,
            dataset,
        };

        Ok(Session {
            sink: EventSink::new(settings.clone(), provider.clone())?,
            trace_urls: TraceUrlBuilder::new(settings)?,
            provider,
            config,
        })
    }

    /// Starts a span with the provider's build details and the user's extra
    /// fields. Fields added afterwards take precedence.
    fn new_span(&self, session: &Session, trace_id: &str) -> Event {
        let mut event = session.sink.new_event(trace_id);
        add_provider_fields(session.provider.as_deref(), &ProcessEnv, &mut event);
        add_fields_from_file(self.filename.as_deref(), &mut event);
        event
    }

    async fn send(&self, session: &Session, event: &Event) {
        if let Err(e) = session.sink.send(event).await {
            warn!("Failed to send event: {e}");
            warn_user(self.quiet, format!("failed to send event: {e}"));
        }
    }

    async fn print_trace_url(&self, session: &Session, trace_id: &str, start: DateTime<Utc>) {
        match session.trace_urls.build(trace_id, start.timestamp()).await {
            Ok(url) => println!("{url}"),
            Err(e) => eprintln!("Unable to create trace URL: {e}"),
        }
    }

    fn parse_start(&self, raw: &str) -> DateTime<Utc> {
        parse_unix(raw).unwrap_or_else(|| {
            warn_user(self.quiet, format!("couldn't parse startTime of {raw:?}"));
            Utc::now()
        })
    }

    async fn execute_build(
        &self,
        session: &Session,
        trace_id: &str,
        start: &str,
        outcome: &str,
    ) -> Result<()> {
        let trace_id = trace_id.trim();
        let started = self.parse_start(start);
        info!("Sending build span for trace {trace_id}");

        let mut event = self.new_span(session, trace_id);
        let service = session.service_name("build");
        event.add_field("service_name", service);
        event.add_field("service.name", service);
        event.add_field("command_name", "build");
        event.add_field("trace.span_id", trace_id);
        event.add_field("name", format!("build {trace_id}"));
        event.add_field("status", outcome.trim());
        event.add_field("duration_ms", (Utc::now() - started).num_milliseconds());
        event.set_timestamp(started);

        self.send(session, &event).await;
        self.print_trace_url(session, trace_id, started).await;
        Ok(())
    }

    async fn execute_step(
        &self,
        session: &Session,
        trace_id: &str,
        step_id: &str,
        start: &str,
        name: &str,
    ) -> Result<()> {
        let trace_id = trace_id.trim();
        let started = self.parse_start(start);
        info!("Sending step span {step_id} for trace {trace_id}");

        let mut event = self.new_span(session, trace_id);
        let service = session.service_name("step");
        event.add_field("trace.parent_id", trace_id);
        event.add_field("trace.span_id", step_id.trim());
        event.add_field("service_name", service);
        event.add_field("service.name", service);
        event.add_field("command_name", "step");
        event.add_field("name", name.trim());
        event.add_field("duration_ms", (Utc::now() - started).num_milliseconds());
        event.set_timestamp(started);

        self.send(session, &event).await;
        Ok(())
    }

    async fn execute_cmd(
        &self,
        session: &Session,
        trace_id: &str,
        step_id: &str,
        name: &str,
        command: &[String],
    ) -> Result<ExitCode> {
        let command = quote_command(command);
        let mut event = self.new_span(session, trace_id.trim());

        let outcome = run_command(&command).await;

        let service = session.service_name("cmd");
        event.add_field("trace.parent_id", step_id.trim());
        event.add_field("trace.span_id", Uuid::new_v4().simple().to_string());
        event.add_field("service_name", service);
        event.add_field("service.name", service);
        event.add_field("command_name", "cmd");
        event.add_field("name", name);
        event.add_field("duration_ms", outcome.duration.as_millis() as u64);
        event.add_field("cmd", command.as_str());
        match &outcome.failure {
            None => event.add_field("status", "success"),
            Some(reason) => {
                event.add_field("status", "failure");
                event.add_field("failure_reason", reason.as_str());
            }
        }
        event.set_timestamp(outcome.started);

        self.send(session, &event).await;

        if outcome.succeeded() {
            Ok(ExitCode::SUCCESS)
        } else {
            let code = outcome
                .exit_code
                .and_then(|code| u8::try_from(code).ok())
                .filter(|code| *code != 0)
                .unwrap_or(1);
            Ok(ExitCode::from(code))
        }
    }

    fn watch_config(
        session: &Session,
        timeout: Option<u64>,
        checks: Option<u32>,
        credential: Option<Token>,
        self_job: Option<String>,
    ) -> WatchConfig {
        let minutes = timeout.unwrap_or(session.config.watch.timeout_minutes);
        WatchConfig::new(timeout_from_minutes(minutes), credential)
            .with_self_job(self_job)
            .with_confirmations(checks.unwrap_or(session.config.watch.confirmations))
    }

    async fn run_watch<P: ProviderApi>(
        watcher: &Watcher<P>,
        locator: &P::Locator,
    ) -> Result<WatchOutcome> {
        watcher.watch(locator).await.map_err(|e| {
            println!("{} {e}", bright_red("buildevents - Error detected:"));
            e.into()
        })
    }

    async fn report_watch(&self, session: &Session, trace_id: &str, outcome: &WatchOutcome) {
        let settings = session.settings();
        let service = session.service_name("watch");
        let name = if settings.is_classic() {
            format!("watch {trace_id}")
        } else {
            "watch".to_string()
        };

        let mut event = self.new_span(session, trace_id);
        event.add_field("service_name", service);
        event.add_field("service.name", service);
        event.add_field("command_name", "watch");
        event.add_field("trace.span_id", trace_id);
        event.add_field("name", name);
        event.add_field("status", if outcome.passed() { "success" } else { "failed" });
        event.add_field("duration_ms", outcome.duration().num_milliseconds());
        event.add_field("source", "buildevents");
        event.set_timestamp(outcome.started);

        self.send(session, &event).await;
        self.print_trace_url(session, trace_id, outcome.started).await;
    }

    async fn execute_watch(&self, session: &Session, args: &WatchArgs) -> Result<()> {
        ensure!(
            session.provider_kind() == Some(ProviderKind::CircleCi),
            "watch command only valid for {}",
            ProviderKind::CircleCi.as_str()
        );
        let trace_id = args.build_id.trim();
        let workflow_id = required(&args.workflowid, "--workflowid or CIRCLE_WORKFLOW_ID")?;
        info!("Watching CircleCI workflow {workflow_id} for trace {trace_id}");
        output::print_banner();

        let token = args.circlekey.as_deref().map(Token::from);
        let client = CircleCiClient::new(&session.config.circleci.base_url, token.clone())?;
        let config = Self::watch_config(
            session,
            args.timeout,
            args.checks,
            token,
            args.jobname.clone(),
        );

        let outcome = Self::run_watch(&Watcher::new(client, config), &workflow_id).await?;
        self.report_watch(session, trace_id, &outcome).await;
        Ok(())
    }

    async fn execute_bk_watch(&self, session: &Session, args: &BkWatchArgs) -> Result<()> {
        ensure!(
            session.provider_kind() == Some(ProviderKind::Buildkite),
            "bk_watch command only valid for {}",
            ProviderKind::Buildkite.as_str()
        );
        let trace_id = args.build_id.trim();
        let locator = BuildLocator {
            organization: required(&args.org, "--org or BUILDKITE_ORGANIZATION_SLUG")?,
            pipeline: required(&args.pipeline, "--pipeline or BUILDKITE_PIPELINE_SLUG")?,
            number: required(&args.buildnum, "--buildnum or BUILDKITE_BUILD_NUMBER")?,
        };
        info!("Watching Buildkite build {locator} for trace {trace_id}");
        output::print_banner();

        let token = args.apitoken.as_deref().map(Token::from);
        let client = BuildkiteClient::new(&session.config.buildkite.base_url, token.clone())?;
        let config = Self::watch_config(
            session,
            args.timeout,
            args.checks,
            token,
            args.jobid.clone(),
        );

        let outcome = Self::run_watch(&Watcher::new(client, config), &locator).await?;
        self.report_watch(session, trace_id, &outcome).await;
        Ok(())
    }

    pub async fn execute(&self) -> Result<ExitCode> {
        let config = Config::load(self.config.as_deref()).context("Failed to load configuration")?;
        let session = self.session(config)?;

        match &self.command {
            Commands::Build {
                trace_id,
                start,
                outcome,
            } => self.execute_build(&session, trace_id, start, outcome).await?,
            Commands::Step {
                trace_id,
                step_id,
                start,
                name,
            } => {
                self.execute_step(&session, trace_id, step_id, start, name)
                    .await?
            }
            Commands::Cmd {
                trace_id,
                step_id,
                name,
                command,
            } => {
                return self
                    .execute_cmd(&session, trace_id, step_id, name, command)
                    .await
            }
            Commands::Watch(args) => self.execute_watch(&session, args).await?,
            Commands::BkWatch(args) => self.execute_bk_watch(&session, args).await?,
        }

        Ok(ExitCode::SUCCESS)
    }
}

/// Reads a Unix timestamp in seconds. Zero and garbage are rejected.
fn parse_unix(raw: &str) -> Option<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|secs| *secs != 0)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Huge minute counts saturate instead of wrapping.
fn timeout_from_minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

fn required(value: &Option<String>, source: &str) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => bail!("missing value: set {source}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unix() {
        let parsed = parse_unix(" 1700000000 ").unwrap();
        assert_eq!(parsed.timestamp(), 1_700_000_000);
        assert!(parse_unix("0").is_none());
        assert!(parse_unix("yesterday").is_none());
    }

    #[test]
    fn test_timeout_minutes_saturate() {
        assert_eq!(timeout_from_minutes(10), Duration::from_secs(600));
        assert_eq!(timeout_from_minutes(0), Duration::ZERO);
        assert_eq!(timeout_from_minutes(u64::MAX), Duration::from_secs(u64::MAX));
        assert_eq!(
            timeout_from_minutes(300_000_000_000_000_000),
            Duration::from_secs(18_000_000_000_000_000_000)
        );
        assert_eq!(timeout_from_minutes(u64::MAX / 2), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_required_rejects_blank() {
        assert_eq!(required(&Some(" acme ".into()), "--org").unwrap(), "acme");
        assert!(required(&Some("  ".into()), "--org").is_err());
        assert!(required(&None, "--org").is_err());
    }

    #[test]
    fn test_build_outcome_is_validated() {
        assert!(Cli::try_parse_from(["buildevents", "build", "t", "1700000000", "success"]).is_ok());
        assert!(Cli::try_parse_from(["buildevents", "build", "t", "1700000000", "maybe"]).is_err());
    }

    #[test]
    fn test_cmd_requires_separator() {
        let cli = Cli::try_parse_from([
            "buildevents", "cmd", "trace", "step", "tests", "--", "go", "test", "-v",
        ])
        .unwrap();
        match cli.command {
            Commands::Cmd { command, name, .. } => {
                assert_eq!(name, "tests");
                assert_eq!(command, vec!["go", "test", "-v"]);
            }
            _ => panic!("expected cmd"),
        }

        assert!(Cli::try_parse_from(["buildevents", "cmd", "trace", "step", "tests", "go"]).is_err());
    }

    #[test]
    fn test_watch_flags() {
        let cli = Cli::try_parse_from([
            "buildevents", "watch", "trace", "-t", "20", "-w", "wf-1", "--checks", "5", "-q",
        ])
        .unwrap();
        assert!(cli.quiet);
        match cli.command {
            Commands::Watch(args) => {
                assert_eq!(args.build_id, "trace");
                assert_eq!(args.timeout, Some(20));
                assert_eq!(args.workflowid.as_deref(), Some("wf-1"));
                assert_eq!(args.checks, Some(5));
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_bk_watch_subcommand_name() {
        let cli = Cli::try_parse_from([
            "buildevents", "bk_watch", "trace", "--org", "acme", "--pipeline", "web",
            "--buildnum", "42",
        ])
        .unwrap();
        match cli.command {
            Commands::BkWatch(args) => {
                assert_eq!(args.org.as_deref(), Some("acme"));
                assert_eq!(args.buildnum.as_deref(), Some("42"));
            }
            _ => panic!("expected bk_watch"),
        }
    }

    #[test]
    fn test_service_name_alias() {
        let cli =
            Cli::try_parse_from(["buildevents", "--service_name", "web", "step", "t", "s", "1", "n"])
                .unwrap();
        assert_eq!(cli.service_name.as_deref(), Some("web"));
    }
}
