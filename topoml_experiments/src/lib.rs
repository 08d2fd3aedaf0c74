//! Shared glue for the experiment binaries: run mode, run reports,
//! notifications and tracing set-up.

pub mod cli;
pub mod notify;
pub mod report;

pub use cli::{Cli, RunMode};
pub use notify::{notify_best_effort, LogNotifier, NotifyError, Notifier, SlackNotifier};
pub use report::{format_duration, hostname, run_signature, signature, RunSummary};

use tracing_subscriber::{fmt, EnvFilter};

/// Install the `fmt` subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // a second call (tests, repeated runs in one process) keeps the first subscriber
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Notifier for this run: Slack when a webhook is configured, the log otherwise.
pub fn notifier_from(webhook_url: Option<&str>) -> Box<dyn Notifier> {
    match webhook_url {
        Some(url) => Box::new(SlackNotifier::new(url)),
        None => Box::new(LogNotifier),
    }
}
