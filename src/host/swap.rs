//! Swap specifications (`hx-swap`) and interval parsing.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

static INTERVAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)(ms|s|m)?$").expect("interval regex is valid")
});

/// How swapped content is placed relative to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SwapStyle {
    #[default]
    #[serde(rename = "innerHTML")]
    InnerHtml,
    #[serde(rename = "outerHTML")]
    OuterHtml,
    #[serde(rename = "beforebegin")]
    BeforeBegin,
    #[serde(rename = "afterbegin")]
    AfterBegin,
    #[serde(rename = "beforeend")]
    BeforeEnd,
    #[serde(rename = "afterend")]
    AfterEnd,
    #[serde(rename = "delete")]
    Delete,
    #[serde(rename = "none")]
    None,
}

impl SwapStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InnerHtml => "innerHTML",
            Self::OuterHtml => "outerHTML",
            Self::BeforeBegin => "beforebegin",
            Self::AfterBegin => "afterbegin",
            Self::BeforeEnd => "beforeend",
            Self::AfterEnd => "afterend",
            Self::Delete => "delete",
            Self::None => "none",
        }
    }
}

impl fmt::Display for SwapStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "innerHTML" => Ok(Self::InnerHtml),
            "outerHTML" => Ok(Self::OuterHtml),
            "beforebegin" => Ok(Self::BeforeBegin),
            "afterbegin" => Ok(Self::AfterBegin),
            "beforeend" => Ok(Self::BeforeEnd),
            "afterend" => Ok(Self::AfterEnd),
            "delete" => Ok(Self::Delete),
            "none" => Ok(Self::None),
            other => Err(format!("Unknown swap style '{}'", other)),
        }
    }
}

/// Resolved swap strategy for one swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapSpec {
    pub style: SwapStyle,
    pub settle_delay: Duration,
}

impl SwapSpec {
    pub fn new(style: SwapStyle, settle_delay: Duration) -> Self {
        Self {
            style,
            settle_delay,
        }
    }

    /// Parse an `hx-swap` value such as `"beforeend settle:200ms"`.
    ///
    /// Unknown styles fall back to `default_style`; unknown modifiers are
    /// ignored.
    pub fn parse(value: &str, default_style: SwapStyle, default_settle: Duration) -> Self {
        let mut spec = Self::new(default_style, default_settle);
        for (index, token) in value.split_whitespace().enumerate() {
            if let Some((modifier, argument)) = token.split_once(':') {
                match modifier {
                    "settle" => match parse_interval(argument) {
                        Some(delay) => spec.settle_delay = delay,
                        None => tracing::warn!(argument, "invalid settle interval"),
                    },
                    _ => tracing::debug!(modifier, "ignoring swap modifier"),
                }
            } else if index == 0 {
                match token.parse() {
                    Ok(style) => spec.style = style,
                    Err(e) => tracing::warn!("{}", e),
                }
            }
        }
        spec
    }
}

/// Parse an htmx interval: `"100ms"`, `"2s"`, `"1m"` or bare milliseconds.
pub fn parse_interval(value: &str) -> Option<Duration> {
    let captures = INTERVAL_RE.captures(value.trim())?;
    let amount: f64 = captures.get(1)?.as_str().parse().ok()?;
    let millis = match captures.get(2).map(|m| m.as_str()) {
        Some("s") => amount * 1000.0,
        Some("m") => amount * 60_000.0,
        _ => amount,
    };
    Some(Duration::from_micros((millis * 1000.0).round() as u64))
}
