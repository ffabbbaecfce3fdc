//! Config hashing.
//!
//! Gateways poll for their rule set and compare the hash with the one they
//! already enforce. The hash input is the canonical JSON of the rule list
//! (serde_json, no pretty-printing), so any change to any field of any rule,
//! or to rule order, changes the hash.

use sha2::{Digest, Sha256};

use ztna_contracts::error::{ZtnaError, ZtnaResult};

use crate::rule::GatewayRule;

/// Hash reported for a gateway with no rules.
pub const EMPTY_CONFIG_HASH: &str = "empty";

/// Compute the config hash of `rules`.
///
/// Returns a lowercase 64-character hex string, or [`EMPTY_CONFIG_HASH`]
/// for an empty rule list.
pub fn config_hash(rules: &[GatewayRule]) -> ZtnaResult<String> {
    if rules.is_empty() {
        return Ok(EMPTY_CONFIG_HASH.to_string());
    }

    let rules_json = serde_json::to_vec(rules).map_err(|e| ZtnaError::CompileError {
        reason: format!("failed to serialize gateway rules: {}", e),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&rules_json);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use ztna_contracts::policy::PolicyId;

    use super::*;
    use crate::rule::{DestinationTagType, RuleAction, SourceTag, SourceTagType};

    fn rule(name: &str, priority: i32) -> GatewayRule {
        GatewayRule {
            policy_id: PolicyId::from(name),
            name: name.to_string(),
            action: RuleAction::Allow,
            priority,
            sources: vec![SourceTag::new(SourceTagType::Identity, "group:eng")],
            destination_tag_type: DestinationTagType::Cidr,
            destination_value: "10.0.0.0/8".to_string(),
        }
    }

    #[test]
    fn empty_rules_hash_to_sentinel() {
        assert_eq!(config_hash(&[]).unwrap(), "empty");
    }

    #[test]
    fn hash_is_deterministic_hex() {
        let rules = vec![rule("a", 100), rule("b", 200)];
        let first = config_hash(&rules).unwrap();
        assert_eq!(first, config_hash(&rules.clone()).unwrap());
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn any_field_change_changes_hash() {
        let base = vec![rule("a", 100)];
        let mut changed = base.clone();
        changed[0].destination_value = "10.0.0.0/9".to_string();
        assert_ne!(config_hash(&base).unwrap(), config_hash(&changed).unwrap());

        let reordered = vec![rule("b", 200), rule("a", 100)];
        let ordered = vec![rule("a", 100), rule("b", 200)];
        assert_ne!(config_hash(&reordered).unwrap(), config_hash(&ordered).unwrap());
    }
}
