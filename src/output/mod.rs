mod progress;
mod styling;

pub use progress::WatchProgress;
pub use styling::{bright_red, bright_yellow, dim, magenta_bold};

/// Prints the `buildevents` banner to stderr.
///
/// Only used by the interactive watch commands; span commands stay silent so
/// their stdout can be captured by CI scripts.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("⏱  buildevents"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("CI build tracing")
    );
}

/// Prints a warning to stderr unless `quiet` is set.
pub fn warn_user(quiet: bool, message: impl std::fmt::Display) {
    if !quiet {
        eprintln!("{} {message}", bright_yellow("WARN:"));
    }
}
