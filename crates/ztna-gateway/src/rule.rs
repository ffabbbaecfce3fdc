//! Flat gateway rule types.
//!
//! A gateway enforces a list of rules, each a conjunction of source tags and
//! one destination. Rules are evaluated by the gateway in priority order.

use std::fmt;

use serde::{Deserialize, Serialize};

use ztna_contracts::policy::PolicyId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleAction {
    Allow,
    Deny,
}

/// The kind of fact a source tag asserts about the connecting client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTagType {
    /// Group membership, value `group:<name>`.
    Identity,
    /// Exact user email, lower-cased.
    User,
    /// Email domain, lower-cased, without a leading `@`.
    EmailSuffix,
    #[serde(rename = "SourceCIDR")]
    SourceCidr,
    Country,
    PrivateSource,
    #[serde(rename = "DeviceOS")]
    DeviceOs,
    DeviceManaged,
}

impl fmt::Display for SourceTagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Identity => "Identity",
            Self::User => "User",
            Self::EmailSuffix => "EmailSuffix",
            Self::SourceCidr => "SourceCIDR",
            Self::Country => "Country",
            Self::PrivateSource => "PrivateSource",
            Self::DeviceOs => "DeviceOS",
            Self::DeviceManaged => "DeviceManaged",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceTag {
    pub tag_type: SourceTagType,
    pub value: String,
}

impl SourceTag {
    pub fn new(tag_type: SourceTagType, value: impl Into<String>) -> Self {
        Self {
            tag_type,
            value: value.into(),
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.tag_type, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DestinationTagType {
    /// One or more comma-separated IPv4 CIDRs.
    Cidr,
    Sni,
}

/// One enforceable rule. An empty `sources` list matches every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRule {
    pub policy_id: PolicyId,
    pub name: String,
    pub action: RuleAction,
    pub priority: i32,
    pub sources: Vec<SourceTag>,
    pub destination_tag_type: DestinationTagType,
    pub destination_value: String,
}

/// The compiled rule set for one gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub rules: Vec<GatewayRule>,
    /// SHA-256 hex of the rules, or `"empty"` when there are none.
    pub config_hash: String,
}
