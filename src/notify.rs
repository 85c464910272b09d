use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::NotifyConfig;
use crate::http_client::http_client;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookStyle {
    /// Plain-text body with a `Title` header (ntfy and friends).
    PlainText,
    /// JSON `{"content": ...}` body (Discord-style hooks).
    JsonContent,
}

pub fn webhook_style(url: &str) -> WebhookStyle {
    let lower = url.to_ascii_lowercase();
    if lower.contains("discord.com/api/webhooks") || lower.contains("discordapp.com/api/webhooks")
    {
        WebhookStyle::JsonContent
    } else {
        WebhookStyle::PlainText
    }
}

pub fn send_notification(cfg: &NotifyConfig, text: &str) -> Result<()> {
    let Some(url) = cfg.webhook_url.as_deref() else {
        return Ok(());
    };
    let client = http_client()?;
    let req = match webhook_style(url) {
        WebhookStyle::JsonContent => client.post(url).json(&WebhookPayload { content: text }),
        WebhookStyle::PlainText => client
            .post(url)
            .header("Title", cfg.title.as_str())
            .body(text.to_string()),
    };
    let resp = req.send().context("notification request failed")?;
    let status = resp.status();
    if !status.is_success() {
        return Err(anyhow!("notification http {status}"));
    }
    info!(%status, "notification sent");
    Ok(())
}

/// Notification failures are logged and never fail the run.
pub fn notify_best_effort(cfg: &NotifyConfig, text: &str) {
    if let Err(err) = send_notification(cfg, text) {
        warn!(error = %format!("{err:#}"), "notification failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discord_urls_get_json_payloads() {
        assert_eq!(
            webhook_style("https://discord.com/api/webhooks/1/abc"),
            WebhookStyle::JsonContent
        );
        assert_eq!(
            webhook_style("https://ntfy.sh/my-league"),
            WebhookStyle::PlainText
        );
    }

    #[test]
    fn missing_url_is_a_no_op() {
        let cfg = NotifyConfig::default();
        assert!(send_notification(&cfg, "hello").is_ok());
    }
}
