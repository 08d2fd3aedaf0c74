//! End-of-run notifications.
//!
//! A run reports its summary through a [`Notifier`]. Delivery is best-effort:
//! [`notify_best_effort`] logs a failed delivery and the run still succeeds.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook rejected the message with status {0}")]
    Rejected(u16),
}

pub trait Notifier {
    fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError>;
}

/// Writes the message to the log; used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError> {
        info!(title, "{}", message);
        Ok(())
    }
}

/// Posts a Block Kit message to a Slack incoming webhook.
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    webhook_url: String,
    timeout: Duration,
}

impl SlackNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl Notifier for SlackNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let response = client
            .post(&self.webhook_url)
            .json(&slack_payload(title, message))
            .send()?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SlackPayload {
    text: String,
    blocks: Vec<SlackBlock>,
}

#[derive(Debug, Serialize)]
struct SlackBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: SlackText,
}

#[derive(Debug, Serialize)]
struct SlackText {
    #[serde(rename = "type")]
    text_type: String,
    text: String,
}

fn slack_payload(title: &str, message: &str) -> SlackPayload {
    SlackPayload {
        text: format!("{title} {message}"),
        blocks: vec![
            SlackBlock {
                block_type: "header".to_string(),
                text: SlackText {
                    text_type: "plain_text".to_string(),
                    text: title.to_string(),
                },
            },
            SlackBlock {
                block_type: "section".to_string(),
                text: SlackText {
                    text_type: "mrkdwn".to_string(),
                    text: message.to_string(),
                },
            },
        ],
    }
}

/// Deliver `message` under `title` and print the completion line for
/// `script`; a delivery failure is only logged. Returns whether the notifier
/// accepted the message.
pub fn notify_best_effort(
    notifier: &dyn Notifier,
    title: &str,
    script: &str,
    message: &str,
) -> bool {
    let delivered = match notifier.notify(title, message) {
        Ok(()) => true,
        Err(err) => {
            warn!(title, error = %err, "could not deliver run notification");
            false
        }
    };
    println!("{script} finished successfully with {message}");
    delivered
}
