use std::fmt::Display;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::watch::Verdict;

use super::styling::{bright_green, bright_red, bright_yellow, dim};

/// Spinner shown on stderr while a watch waits for a build.
///
/// Per-tick lines go to stdout through [`WatchProgress::println`], which
/// suspends the spinner so lines stay readable in terminals and CI logs alike.
pub struct WatchProgress {
    pb: ProgressBar,
    target: String,
}

impl WatchProgress {
    pub fn start(target: &str) -> Self {
        let pb = create_spinner(bright_yellow(format!("Waiting for {target} to finish")).to_string());
        Self {
            pb,
            target: target.to_string(),
        }
    }

    pub fn set_status(&self, summary: &str) {
        self.pb.set_message(format!(
            "{} {}",
            bright_yellow(format!("Waiting for {} to finish", self.target)),
            dim(format!("({summary})"))
        ));
    }

    pub fn println(&self, line: impl Display) {
        self.pb.suspend(|| println!("{line}"));
    }

    pub fn finish(self, verdict: Verdict) {
        self.pb.finish_and_clear();
        match verdict {
            Verdict::Passed => println!("{}", bright_green("Build passed!")),
            Verdict::Failed => println!("{}", bright_red("Build failed!")),
            Verdict::TimedOut => eprintln!(
                "{}",
                bright_yellow(format!(
                    "Timeout reached waiting for {} to finish",
                    self.target
                ))
            ),
        }
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {msg} {spinner} {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
