use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::debug;
use tokio::process::Command;

/// What happened when a wrapped build command ran.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub started: DateTime<Utc>,
    pub duration: Duration,
    /// `None` on success
    pub failure: Option<String>,
    /// Child exit code, when it exited normally
    pub exit_code: Option<i32>,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Joins arguments into one shell string, each double-quoted.
pub fn quote_command(args: &[String]) -> String {
    args.iter()
        .map(|arg| format!("\"{}\"", arg.replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs `command` with `bash -c`, sharing this process's stdout and stderr.
pub async fn run_command(command: &str) -> CommandOutcome {
    println!("running /bin/bash -c {command}");

    let started = Utc::now();
    let clock = Instant::now();
    let result = Command::new("/bin/bash")
        .arg("-c")
        .arg(command)
        .status()
        .await;
    let duration = clock.elapsed();
    debug!("Command finished after {duration:?}: {result:?}");

    let (failure, exit_code) = match result {
        Ok(status) if status.success() => (None, status.code()),
        Ok(status) => (
            Some(match status.code() {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            }),
            status.code(),
        ),
        Err(e) => (Some(e.to_string()), None),
    };

    CommandOutcome {
        started,
        duration,
        failure,
        exit_code,
    }
}
