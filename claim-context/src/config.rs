use std::path::PathBuf;

use tracing::warn;

use crate::error::{ClaimError, Result};

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_POLICY_PATH: &str = "policy.json";

/// Runtime settings, read from the environment.
///
/// The credential may be absent. It only becomes an error when
/// [`ClaimConfig::api_key`] is asked for it, which the model client does right
/// before its first request.
#[derive(Debug, Clone)]
pub struct ClaimConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub chat_model: String,
    pub vision_model: String,
    pub max_tokens: Option<u32>,
    pub policy_path: PathBuf,
}

impl ClaimConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let chat_model = get("CLAIM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let vision_model = get("CLAIM_VISION_MODEL").unwrap_or_else(|| chat_model.clone());

        let max_tokens = get("CLAIM_MAX_TOKENS").and_then(|raw| match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(value = %raw, "Ignoring CLAIM_MAX_TOKENS: not a positive integer");
                None
            }
        });

        Self {
            api_key: get(API_KEY_VAR),
            api_base: get("CLAIM_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            chat_model,
            vision_model,
            max_tokens,
            policy_path: get("POLICY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_POLICY_PATH)),
        }
    }

    pub fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            ClaimError::Configuration(format!("{API_KEY_VAR} environment variable not set"))
        })
    }
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
