use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{ClaimError, Result};
use crate::format::format_currency;

/// Coverage rules for one insurer/plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub insurer: String,
    pub plan: String,
    pub sum_insured: i64,
    #[serde(default)]
    pub room: RoomRules,
    #[serde(default)]
    pub copay: CopayRules,
    #[serde(default)]
    pub non_payables: Vec<String>,
    /// Any further fields in the source document. They are kept so the
    /// assistant sees the policy exactly as it was written.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomRules {
    #[serde(rename = "type", default)]
    pub room_type: String,
    #[serde(default, deserialize_with = "nullable_amount")]
    pub cap_per_day: Option<i64>,
    #[serde(default)]
    pub proportionate_deduction: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CopayRules {
    #[serde(default)]
    pub percentage: f64,
}

/// Policy files in the wild write a missing cap as `null`, `"null"` or `""`.
fn nullable_amount<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Number(i64),
        Text(String),
    }

    match Option::<Amount>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Amount::Number(n)) => Ok(Some(n)),
        Some(Amount::Text(text)) => {
            let text = text.trim();
            if text.is_empty() || text.eq_ignore_ascii_case("null") {
                Ok(None)
            } else {
                text.parse().map(Some).map_err(|_| {
                    serde::de::Error::custom(format!("invalid cap_per_day value '{text}'"))
                })
            }
        }
    }
}

/// Insurer → plan → policy, in the order of the source document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PolicyCatalog {
    insurers: IndexMap<String, IndexMap<String, PolicyRecord>>,
}

impl PolicyCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ClaimError::DataFormat(format!("cannot read {}: {e}", path.display()))
        })?;
        let catalog = Self::from_json_str(&raw)?;

        info!(
            path = %path.display(),
            insurers = catalog.insurers.len(),
            policies = catalog.len(),
            "Loaded policy catalog"
        );
        Ok(catalog)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let insurers: IndexMap<String, IndexMap<String, PolicyRecord>> =
            serde_json::from_str(raw)
                .map_err(|e| ClaimError::DataFormat(format!("malformed policy data: {e}")))?;

        let catalog = Self { insurers };
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(ClaimError::DataFormat(
                "policy catalog contains no policies".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for record in self.records() {
            if !seen.insert((record.insurer.as_str(), record.plan.as_str())) {
                return Err(ClaimError::DataFormat(format!(
                    "duplicate policy for insurer '{}' and plan '{}'",
                    record.insurer, record.plan
                )));
            }
        }
        Ok(())
    }

    pub fn lookup(&self, insurer: &str, plan: &str) -> Result<&PolicyRecord> {
        self.insurers
            .get(insurer)
            .and_then(|plans| plans.get(plan))
            .ok_or_else(|| ClaimError::NotFound {
                insurer: insurer.to_string(),
                plan: plan.to_string(),
            })
    }

    pub fn insurers(&self) -> impl Iterator<Item = &str> {
        self.insurers.keys().map(String::as_str)
    }

    pub fn plans(&self, insurer: &str) -> impl Iterator<Item = &str> {
        self.insurers
            .get(insurer)
            .into_iter()
            .flat_map(|plans| plans.keys().map(String::as_str))
    }

    pub fn records(&self) -> impl Iterator<Item = &PolicyRecord> {
        self.insurers.values().flat_map(|plans| plans.values())
    }

    pub fn len(&self) -> usize {
        self.insurers.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The policy panel shown next to the chat, as display strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicySummary {
    pub title: String,
    pub sum_insured: String,
    pub room_type: String,
    pub room_cap: String,
    pub proportionate_deduction: bool,
    pub copay: String,
    pub non_payables: String,
}

impl From<&PolicyRecord> for PolicySummary {
    fn from(policy: &PolicyRecord) -> Self {
        let room_type = if policy.room.room_type.trim().is_empty() {
            "-".to_string()
        } else {
            policy.room.room_type.clone()
        };
        let non_payables = if policy.non_payables.is_empty() {
            "—".to_string()
        } else {
            policy.non_payables.join(", ")
        };

        Self {
            title: format!("{} – {}", policy.insurer, policy.plan),
            sum_insured: format_currency(policy.sum_insured as f64),
            room_type,
            room_cap: policy
                .room
                .cap_per_day
                .map(|cap| format_currency(cap as f64))
                .unwrap_or_else(|| "No cap".to_string()),
            proportionate_deduction: policy.room.proportionate_deduction,
            copay: format!("{}%", policy.copay.percentage),
            non_payables,
        }
    }
}
