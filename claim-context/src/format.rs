//! Display shaping for assistant replies and money values.

use std::sync::LazyLock;

use regex::{Captures, Regex};

const BREAKDOWN_LABEL: &str = "Breakdown:";
const BULLET: &str = "\n   - ";

static NUMBERED_POINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+(\d+)\.").expect("Invalid regex"));
static PERIOD_SPACING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[ \t]+").expect("Invalid regex"));
static BULLET_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+-[ \t]+").expect("Invalid regex"));
static EXCESS_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("Invalid regex"));

/// Reshape an assistant reply so numbered points and breakdown bullets each
/// sit on their own line. Only for assistant text; idempotent.
pub fn format_for_display(text: &str) -> String {
    let text = break_numbered_points(text.trim());
    let text = PERIOD_SPACING.replace_all(&text, ". ");
    let text = break_after_label(&text);
    let text = bulletize_breakdown(&text);
    EXCESS_BREAKS.replace_all(&text, "\n\n").trim().to_string()
}

/// "N. " preceded by whitespace starts a new line. The whitespace run before
/// it is replaced by a single line break.
fn break_numbered_points(text: &str) -> String {
    NUMBERED_POINT
        .replace_all(text, |caps: &Captures| {
            let end = caps.get(0).map_or(text.len(), |m| m.end());
            if text[end..].starts_with(char::is_whitespace) {
                format!("\n{}.", &caps[1])
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

fn break_after_label(text: &str) -> String {
    let Some(start) = text.find(BREAKDOWN_LABEL) else {
        return text.to_string();
    };
    let (head, tail) = text.split_at(start + BREAKDOWN_LABEL.len());
    let rest = tail.trim_start_matches([' ', '\t']);

    if rest.is_empty() || rest.starts_with('\n') {
        format!("{head}{rest}")
    } else {
        format!("{head}\n{rest}")
    }
}

/// Inside the breakdown section a hyphen with whitespace on both sides is a
/// list separator.
fn bulletize_breakdown(text: &str) -> String {
    let Some(start) = text.find(BREAKDOWN_LABEL) else {
        return text.to_string();
    };
    let (head, tail) = text.split_at(start + BREAKDOWN_LABEL.len());
    format!("{head}{}", BULLET_SEPARATOR.replace_all(tail, BULLET))
}

/// `₹12,345.00`: rupee sign, comma groups of three, two decimals.
pub fn format_currency(amount: f64) -> String {
    let rounded = format!("{:.2}", amount.abs());
    let (whole, fraction) = rounded
        .split_once('.')
        .unwrap_or((rounded.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && rounded != "0.00" { "-" } else { "" };
    format!("{sign}₹{grouped}.{fraction}")
}
