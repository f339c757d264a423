//! shields.io static badge for the comment header.

use std::fmt::Write;

use crate::error::{PrcovError, Result};
use crate::model::Ratio;

/// Badge color for a coverage rate, compared against thresholds expressed
/// as percentages (e.g. 100 and 70).
pub fn badge_color(rate: Ratio, minimum_green: Ratio, minimum_orange: Ratio) -> &'static str {
    let percent = rate.times(100);
    if percent >= minimum_green {
        "brightgreen"
    } else if percent >= minimum_orange {
        "orange"
    } else {
        "red"
    }
}

/// Build a `https://img.shields.io/badge/<label>-<message>-<color>.svg` URL.
///
/// Dashes and underscores are doubled inside each part, as shields.io uses
/// them as separators. An empty label is left out.
pub fn static_badge_url(label: &str, message: &str, color: &str) -> Result<String> {
    if message.is_empty() || color.is_empty() {
        return Err(PrcovError::Configuration(
            "both a badge message and a color are required".to_string(),
        ));
    }

    let code = [label, message, color]
        .iter()
        .filter(|part| !part.is_empty())
        .map(|part| part.replace('_', "__").replace('-', "--"))
        .collect::<Vec<_>>()
        .join("-");

    Ok(format!(
        "https://img.shields.io/badge/{}",
        percent_encode(&format!("{code}.svg"))
    ))
}

/// Percent-encode everything but unreserved characters and `/`.
fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}
