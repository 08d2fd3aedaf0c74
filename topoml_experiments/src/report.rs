//! Run signatures and the end-of-run summary message.

use std::time::Duration;

use chrono::{DateTime, TimeZone};

/// `<script> <version> <timestamp>` with ':' replaced by '.' so it can name a directory.
pub fn signature<Tz>(script: &str, version: &str, timestamp: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let stamp = timestamp.format("%Y-%m-%d %H:%M:%S%.6f").to_string();
    format!("{} {} {}", script, version, stamp.replace(':', "."))
}

/// Signature stamped with the local time now.
pub fn run_signature(script: &str, version: &str) -> String {
    signature(script, version, &chrono::Local::now())
}

/// `H:MM:SS.ffffff`; hours are not wrapped at a day.
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "{}:{:02}:{:02}.{:06}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        elapsed.subsec_micros()
    )
}

/// Name of this machine, `unknown` when it cannot be read.
pub fn hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Outcome of one neural training run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub hostname: String,
    pub accuracy: f64,
    pub elapsed: Duration,
    pub epochs: usize,
    /// Configuration pairs; rendered sorted by key
    pub settings: Vec<(String, String)>,
}

impl RunSummary {
    pub fn message(&self) -> String {
        let mut message = format!(
            "on {} completed with accuracy of \n{:.6} \nin {} in {} epochs\n",
            self.hostname,
            self.accuracy,
            format_duration(self.elapsed),
            self.epochs
        );
        let mut settings: Vec<&(String, String)> = self.settings.iter().collect();
        settings.sort();
        for (key, value) in settings {
            message.push_str(&format!("{key}: {value}\t"));
        }
        message
    }
}
