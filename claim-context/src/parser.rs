//! Heuristic amount extraction from raw bill text.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::policy::PolicyRecord;

/// Labels for the payable total, strongest first.
static TOTAL_LABELS: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)net\s*payable").expect("Invalid regex"),
        Regex::new(r"(?i)amount\s*payable").expect("Invalid regex"),
        Regex::new(r"(?i)grand\s*total").expect("Invalid regex"),
        Regex::new(r"(?i)\btotal\b").expect("Invalid regex"),
    ]
});

static AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:\.\d{1,2})?\b").expect("Invalid regex"));

fn last_amount(line: &str) -> Option<f64> {
    AMOUNT
        .find_iter(line)
        .last()
        .and_then(|m| m.as_str().parse().ok())
}

/// Best guess at the bill's payable total.
///
/// Labels are tried in priority order. For each label the lines are scanned
/// bottom-up and the last number on the first matching line that has one
/// wins. A lower-priority label is only consulted when no line carrying a
/// stronger one yields a number.
pub fn parse_total_amount(text: &str) -> Option<f64> {
    let lines: Vec<&str> = text.lines().collect();
    TOTAL_LABELS.iter().find_map(|label| {
        lines
            .iter()
            .rev()
            .filter(|line| label.is_match(line))
            .find_map(|line| last_amount(line))
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NonPayableHit {
    pub keyword: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NonPayableSummary {
    pub total: f64,
    pub hits: Vec<NonPayableHit>,
}

/// Sums the amounts on every line that mentions a non-payable keyword as a
/// whole word, case-insensitively. A line is counted once per keyword it
/// contains; hits are ordered by keyword, then by line.
pub fn sum_non_payables<S: AsRef<str>>(text: &str, keywords: &[S]) -> NonPayableSummary {
    let mut summary = NonPayableSummary::default();

    for keyword in keywords {
        let keyword = keyword.as_ref().trim();
        if keyword.is_empty() {
            continue;
        }
        let Ok(pattern) = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(keyword))) else {
            continue;
        };
        for line in text.lines().filter(|line| pattern.is_match(line)) {
            if let Some(amount) = last_amount(line) {
                summary.total += amount;
                summary.hits.push(NonPayableHit {
                    keyword: keyword.to_string(),
                    amount,
                });
            }
        }
    }

    summary
}

/// Both heuristics run against one bill and policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillCheck {
    pub total_payable: Option<f64>,
    pub non_payables: NonPayableSummary,
}

impl BillCheck {
    pub fn run(bill_text: &str, policy: &PolicyRecord) -> Self {
        Self {
            total_payable: parse_total_amount(bill_text),
            non_payables: sum_non_payables(bill_text, &policy.non_payables),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_policy;

    #[test]
    fn net_payable_beats_plain_total() {
        let bill = "Room 2000\nTotal 500\nNet Payable 450";
        assert_eq!(parse_total_amount(bill), Some(450.0));

        // Order of lines does not matter, label strength does.
        let bill = "Net Payable: 450\nTotal 500";
        assert_eq!(parse_total_amount(bill), Some(450.0));
    }

    #[test]
    fn label_priority_and_bottom_up_scan() {
        assert_eq!(parse_total_amount("Amount payable 900\nGrand Total 1000"), Some(900.0));
        assert_eq!(parse_total_amount("GRAND TOTAL 1000\nTotal 1200"), Some(1000.0));
        assert_eq!(parse_total_amount("Total 10\nsub\nTotal 20.50"), Some(20.5));
    }

    #[test]
    fn last_number_on_the_line_wins() {
        assert_eq!(parse_total_amount("Total (3 items) 1499.99"), Some(1499.99));
    }

    #[test]
    fn labelled_lines_without_numbers_are_skipped() {
        assert_eq!(parse_total_amount("Total 750\nNet Payable: see below"), Some(750.0));
        assert_eq!(parse_total_amount("Net Payable 300\nNet payable: n/a"), Some(300.0));
    }

    #[test]
    fn no_label_means_no_total() {
        assert_eq!(parse_total_amount("Room 2000\nMedicines 300"), None);
        assert_eq!(parse_total_amount(""), None);
        // "subtotal" is not the word "total".
        assert_eq!(parse_total_amount("Subtotal 400"), None);
    }

    #[test]
    fn sums_lines_per_keyword() {
        let bill = "Registration 100\nAdmin Fee 50\nRoom 2000";
        let summary = sum_non_payables(bill, &["registration", "admin fee"]);

        assert_eq!(summary.total, 150.0);
        assert_eq!(
            summary.hits,
            vec![
                NonPayableHit { keyword: "registration".into(), amount: 100.0 },
                NonPayableHit { keyword: "admin fee".into(), amount: 50.0 },
            ]
        );
    }

    #[test]
    fn keywords_match_whole_words_and_are_literal() {
        let bill = "Gloves 30\nGlovesets 99\nX-Ray film 120\nXray 80";
        let summary = sum_non_payables(bill, &["gloves", "x-ray", "", "  "]);

        assert_eq!(summary.total, 30.0 + 120.0);
        assert_eq!(summary.hits.len(), 2);
    }

    #[test]
    fn keyword_without_amount_contributes_nothing() {
        let summary = sum_non_payables("Registration waived", &["registration"]);
        assert_eq!(summary, NonPayableSummary::default());
    }

    #[test]
    fn bill_check_uses_policy_keywords() {
        let policy = sample_policy();
        let check = BillCheck::run("Registration 100\nAdmin fee 50\nNet Payable 4,150", &policy);

        assert_eq!(check.non_payables.total, 150.0);
        // Thousands separators are not understood; the last plain number wins.
        assert_eq!(check.total_payable, Some(150.0));
    }
}
