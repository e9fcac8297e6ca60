//! New-ATH alerts delivered to a Discord-style webhook
//!
//! Formatting helpers are pure and tested in isolation; delivery goes
//! through the `Notifier` trait so the poll loop can be exercised without
//! network access.

use crate::pool::{PoolSnapshot, WorkerSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const BOT_NAME: &str = "AxeBCH";
const EMBED_TITLE: &str = "🔥 NEW WORKER ATH!";
const EMBED_COLOR: u32 = 706_958; // BCH green
const THUMBNAIL_URL: &str = "https://cryptologos.cc/logos/bitcoin-cash-bch-logo.png";
const FOOTER_TEXT: &str = "AxeBCH Solo Node";
const PROGRESS_WIDTH: usize = 18;

/// Shown when the network difficulty is unknown
pub const MISSING_VALUE: &str = "—";

const UNITS: [&str; 7] = ["", "K", "M", "G", "T", "P", "E"];

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Webhook request failed: {0}")]
    Transport(String),

    #[error("Webhook rejected alert: HTTP {status}")]
    Rejected { status: u16 },
}

/// Scale by powers of 1000: `999 -> "999"`, `1000 -> "1.00K"`, `1234567 -> "1.23M"`
pub fn format_mining_number(value: f64) -> String {
    let mut num = value;
    let mut index = 0;

    while num >= 1000.0 && index < UNITS.len() - 1 {
        num /= 1000.0;
        index += 1;
    }

    if index == 0 {
        format!("{}", num.trunc() as i64)
    } else {
        format!("{:.2}{}", num, UNITS[index])
    }
}

/// Text bar plus percentage; the ratio is clamped to [0, 1] for display
pub fn progress_bar(ratio: f64, width: usize) -> String {
    let clamped = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
    let filled = ((clamped * width as f64) as usize).min(width);
    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(width - filled));
    format!("`{}` **{:.2}%**", bar, clamped * 100.0)
}

/// Worker label for display: the part after the first `.`, whitespace
/// collapsed, title-cased. `"Unknown"` when nothing is left.
pub fn pretty_worker_name(raw_name: &str) -> String {
    let suffix = raw_name
        .split_once('.')
        .map(|(_, worker)| worker)
        .unwrap_or(raw_name);
    let collapsed = suffix.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.is_empty() {
        "Unknown".to_string()
    } else {
        title_case(&collapsed)
    }
}

/// Upper-case the first letter of every alphabetic run, lower-case the rest
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}

/// Everything an alert needs about one new record
#[derive(Debug, Clone, PartialEq)]
pub struct AthAlert {
    pub display_name: String,
    pub best_ever: u64,
    pub last_share_ago_secs: Option<u64>,
    pub pool: PoolSnapshot,
}

impl AthAlert {
    pub fn new(best_ever: u64, worker: &WorkerSnapshot, pool: &PoolSnapshot) -> Self {
        Self {
            display_name: pretty_worker_name(&worker.raw_name),
            best_ever,
            last_share_ago_secs: worker.last_share_ago_secs,
            pool: pool.clone(),
        }
    }

    /// Network difficulty truncated to a whole number, when usable
    pub fn network_difficulty(&self) -> Option<f64> {
        self.pool
            .network_difficulty
            .filter(|d| d.is_finite())
            .map(f64::trunc)
            .filter(|d| *d > 0.0)
    }

    /// Best share over network difficulty; 0 when the difficulty is unknown.
    /// May exceed 1.
    pub fn progress_ratio(&self) -> f64 {
        match self.network_difficulty() {
            Some(diff) if diff > 0.0 => self.best_ever as f64 / diff,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub username: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub thumbnail: EmbedImage,
    pub fields: Vec<EmbedField>,
    pub timestamp: String,
    pub footer: EmbedFooter,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    fn new(name: &str, value: String, inline: bool) -> Self {
        Self {
            name: name.to_string(),
            value,
            inline,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// Build the webhook body for `alert`, stamped with `now`
pub fn build_payload(alert: &AthAlert, now: DateTime<Utc>) -> WebhookPayload {
    let diff_formatted = alert
        .network_difficulty()
        .map(format_mining_number)
        .unwrap_or_else(|| MISSING_VALUE.to_string());

    let mut fields = vec![
        EmbedField::new("🏷 Worker", format!("**{}**", alert.display_name), true),
        EmbedField::new(
            "🎯 Best Share",
            format!("`{}`", format_mining_number(alert.best_ever as f64)),
            true,
        ),
        EmbedField::new("⛏ Block Diff", format!("`{}`", diff_formatted), true),
        EmbedField::new(
            "📈 Progress to Block",
            progress_bar(alert.progress_ratio(), PROGRESS_WIDTH),
            false,
        ),
    ];

    if let Some(height) = alert.pool.network_height.as_deref().filter(|h| !h.is_empty()) {
        fields.push(EmbedField::new("📏 Height", format!("`{}`", height), true));
    }
    if let Some(eta) = alert.pool.eta_text.as_deref().filter(|e| !e.is_empty()) {
        fields.push(EmbedField::new("⏳ ETA", format!("`{}`", eta), true));
    }
    if let Some(ago) = alert.last_share_ago_secs {
        fields.push(EmbedField::new("⏱ Last Share Ago", format!("`{}s`", ago), true));
    }

    WebhookPayload {
        username: BOT_NAME.to_string(),
        embeds: vec![Embed {
            title: EMBED_TITLE.to_string(),
            description: format!("**{}** just hit a new best share!", alert.display_name),
            color: EMBED_COLOR,
            thumbnail: EmbedImage {
                url: THUMBNAIL_URL.to_string(),
            },
            fields,
            timestamp: now.to_rfc3339(),
            footer: EmbedFooter {
                text: FOOTER_TEXT.to_string(),
            },
        }],
    }
}

/// Alert delivery
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `alert` to `target`. An empty target is a silent no-op.
    async fn notify(&self, target: &str, alert: &AthAlert) -> Result<(), DeliveryError>;
}

/// Posts alerts to a Discord webhook URL
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, target: &str, alert: &AthAlert) -> Result<(), DeliveryError> {
        let target = target.trim();
        if target.is_empty() {
            return Ok(());
        }

        let payload = build_payload(alert, Utc::now());
        let response = self
            .client
            .post(target)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DeliveryError::Rejected {
                status: response.status().as_u16(),
            });
        }

        debug!(worker = %alert.display_name, best = alert.best_ever, "Alert delivered");
        Ok(())
    }
}
