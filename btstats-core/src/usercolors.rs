//! User color stylesheet
//!
//! The chat publishes nickname colors as a script of the form
//! `name = {"nick": {"color": "#abc", ...}, ...}`. This module fetches that
//! script and turns it into one CSS rule per colored nickname.

use crate::config::UserColorsConfig;
use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

/// Leading `name =` assignment in front of the JSON object.
static ASSIGNMENT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^=]+=").expect("hardcoded regex"));

/// Build the stylesheet from the raw script body.
///
/// Rules follow the script's key order. Entries whose `color` is missing, null,
/// empty, zero, `false` or not a scalar are skipped.
pub fn render_css(body: &str) -> Result<String> {
    let json = ASSIGNMENT_PREFIX.replace(body, "");
    let colors: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&json)
        .map_err(|e| Error::Upstream(format!("malformed color map: {}", e)))?;

    let rules: Vec<String> = colors
        .iter()
        .filter_map(|(nick, attrs)| {
            let color = color_text(attrs.get("color")?)?;
            Some(format!(
                "tr[data-id=\"{nick}\"] {{ --usercolor: {color}; }}"
            ))
        })
        .collect();

    Ok(rules.join("\n"))
}

/// CSS text of a set `color` value. Numbers and `true` use their JSON text.
fn color_text(color: &serde_json::Value) -> Option<String> {
    match color {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        serde_json::Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// HTTP client for the remote color map.
#[derive(Debug, Clone)]
pub struct UserColorsClient {
    http_client: reqwest::Client,
    url: String,
}

impl UserColorsClient {
    pub fn new(config: &UserColorsConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: config.url.clone(),
        })
    }

    /// Fetch the color map once and render it. No retries.
    pub async fn fetch_css(&self) -> Result<String> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "color service returned {} for {}",
                status, self.url
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Upstream(format!("failed to read response: {}", e)))?;

        let css = render_css(&body)?;
        tracing::debug!(url = %self.url, bytes = css.len(), "Rendered user colors");
        Ok(css)
    }
}
