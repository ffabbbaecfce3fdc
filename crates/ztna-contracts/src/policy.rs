//! Policy envelopes: the named, prioritized wrappers around a condition tree.
//!
//! `AccessPolicy` gates network/application access at a gateway;
//! `SignInPolicy` gates authentication before or after identity is known.
//! Lower `priority` values are evaluated first.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::condition::ConditionType;
use crate::node::PolicyNode;

/// Gap left between consecutive default priorities so operators can insert
/// policies between existing ones.
pub const PRIORITY_STEP: i32 = 100;

/// The priority a new policy receives when `existing` policies already exist:
/// `(existing + 1) * 100`.
pub fn priority_after(existing: usize) -> i32 {
    i32::try_from(existing)
        .unwrap_or(i32::MAX)
        .saturating_add(1)
        .saturating_mul(PRIORITY_STEP)
}

/// Stable identifier of a policy envelope. Empty until the store assigns one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(pub String);

impl PolicyId {
    /// Create a new, random policy id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Return true if no id has been assigned yet.
    pub fn is_unassigned(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PolicyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// What an access policy does when its tree matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

/// Which destination field of an `AccessPolicy` is authoritative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationType {
    Cidr,
    App,
    Sni,
    /// The policy applies to every destination.
    #[default]
    None,
}

impl fmt::Display for DestinationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cidr => "cidr",
            Self::App => "app",
            Self::Sni => "sni",
            Self::None => "none",
        };
        f.write_str(s)
    }
}

/// The destination an access policy targets, as selected by
/// `destination_type`. Fields not selected are never surfaced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationRef<'a> {
    Any,
    Cidr(&'a str),
    App(&'a str),
    Sni(&'a str),
    /// `destination_type` names a field that is absent or blank.
    Missing(DestinationType),
}

/// When a sign-in policy is evaluated relative to authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Before the user is identified: only network and device facts exist.
    PreAuth,
    /// After authentication: identity and device facts.
    PostAuth,
}

impl Stage {
    /// Condition types a tree of this stage may contain.
    pub fn allowed_types(self) -> &'static [ConditionType] {
        match self {
            Self::PreAuth => &[ConditionType::Network, ConditionType::Device],
            Self::PostAuth => &[ConditionType::User, ConditionType::Device],
        }
    }

    pub fn allows(self, kind: ConditionType) -> bool {
        self.allowed_types().contains(&kind)
    }

    /// The condition type an editor inserts by default in this stage.
    pub fn default_type(self) -> ConditionType {
        match self {
            Self::PreAuth => ConditionType::Network,
            Self::PostAuth => ConditionType::User,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreAuth => f.write_str("pre_auth"),
            Self::PostAuth => f.write_str("post_auth"),
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

/// A network/application access rule enforced by gateways.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    #[serde(default)]
    pub id: PolicyId,
    pub name: String,
    pub priority: i32,
    pub effect: Effect,
    #[serde(default)]
    pub destination_type: DestinationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_cidr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_sni: Option<String>,
    #[serde(default)]
    pub root_node: PolicyNode,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Gateways this policy is deployed to. Empty means every gateway.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub node_ids: BTreeSet<String>,
    /// Optimistic-concurrency token, managed by the store. 0 = never saved.
    #[serde(default)]
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AccessPolicy {
    /// A new, enabled allow-policy with an empty tree and no destination.
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            id: PolicyId::default(),
            name: name.into(),
            priority,
            effect: Effect::Allow,
            destination_type: DestinationType::None,
            destination_cidr: None,
            destination_app_id: None,
            destination_sni: None,
            root_node: PolicyNode::empty(),
            enabled: true,
            node_ids: BTreeSet::new(),
            version: 0,
            updated_at: None,
        }
    }

    /// Resolve the authoritative destination. Stale values in the fields not
    /// selected by `destination_type` are ignored.
    pub fn destination(&self) -> DestinationRef<'_> {
        fn present(field: &Option<String>) -> Option<&str> {
            field.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }

        match self.destination_type {
            DestinationType::None => DestinationRef::Any,
            DestinationType::Cidr => present(&self.destination_cidr)
                .map_or(DestinationRef::Missing(DestinationType::Cidr), DestinationRef::Cidr),
            DestinationType::App => present(&self.destination_app_id)
                .map_or(DestinationRef::Missing(DestinationType::App), DestinationRef::App),
            DestinationType::Sni => present(&self.destination_sni)
                .map_or(DestinationRef::Missing(DestinationType::Sni), DestinationRef::Sni),
        }
    }

    /// Return true if this policy is deployed to the gateway `node_id`.
    /// A policy with no `node_ids` is deployed everywhere; a restricted
    /// policy never applies to an unidentified gateway.
    pub fn deployed_to(&self, node_id: Option<&str>) -> bool {
        if self.node_ids.is_empty() {
            return true;
        }
        node_id.is_some_and(|id| self.node_ids.contains(id))
    }
}

/// An authentication gate. When the tree matches and `block` is set, the
/// sign-in is refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInPolicy {
    #[serde(default)]
    pub id: PolicyId,
    pub name: String,
    pub priority: i32,
    #[serde(default)]
    pub block: bool,
    pub stage: Stage,
    #[serde(default)]
    pub root_node: PolicyNode,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SignInPolicy {
    /// A new, enabled, non-blocking policy with an empty tree.
    pub fn new(name: impl Into<String>, priority: i32, stage: Stage) -> Self {
        Self {
            id: PolicyId::default(),
            name: name.into(),
            priority,
            block: false,
            stage,
            root_node: PolicyNode::empty(),
            enabled: true,
            version: 0,
            updated_at: None,
        }
    }
}

/// A named, reusable set of CIDRs that access policies can target by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Ordered, de-duplicated IPv4 CIDR strings.
    #[serde(default)]
    pub cidrs: Vec<String>,
}

/// A file-level collection of policies and the applications they reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyBundle {
    #[serde(default)]
    pub access_policies: Vec<AccessPolicy>,
    #[serde(default)]
    pub sign_in_policies: Vec<SignInPolicy>,
    #[serde(default)]
    pub applications: Vec<Application>,
}
