//! Evaluator configuration.
//!
//! The TOML document has a single `[evaluation]` table. Every key is
//! optional; omitted keys take the defaults below.
//!
//! ```toml
//! [evaluation]
//! resolution = "first-match"     # or "deny-overrides"
//! vacuous-or = true              # an OR branch with no children matches
//! access-default = "deny"        # verdict when no access policy matches
//! sign-in-default = "allow"      # verdict when no sign-in policy matches
//! node-id = "gw-eu-1"            # gateway identity for node_ids filtering
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use ztna_contracts::{
    context::Verdict,
    error::{ZtnaError, ZtnaResult},
};

/// How matching policies are combined into one decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resolution {
    /// The first matching policy in priority order decides.
    #[default]
    FirstMatch,
    /// Any matching deny/block policy decides; otherwise the first matching
    /// allow policy does.
    DenyOverrides,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineConfig {
    pub resolution: Resolution,
    pub vacuous_or: bool,
    pub access_default: Verdict,
    pub sign_in_default: Verdict,
    /// The gateway this evaluator runs on. `None` means the evaluator is not
    /// bound to a gateway, so only policies without `node_ids` apply.
    pub node_id: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::FirstMatch,
            vacuous_or: true,
            access_default: Verdict::Deny,
            sign_in_default: Verdict::Allow,
            node_id: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    evaluation: EngineConfig,
}

impl EngineConfig {
    /// Parse `s` as an engine TOML document.
    ///
    /// Returns `ZtnaError::ConfigError` if the TOML is malformed or a value
    /// is outside its vocabulary.
    pub fn from_toml_str(s: &str) -> ZtnaResult<Self> {
        let file: ConfigFile = toml::from_str(s).map_err(|e| ZtnaError::ConfigError {
            reason: format!("failed to parse engine TOML: {}", e),
        })?;
        Ok(file.evaluation)
    }

    pub fn from_file(path: &Path) -> ZtnaResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ZtnaError::ConfigError {
            reason: format!("failed to read engine config '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }
}
