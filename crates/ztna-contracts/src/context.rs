//! Request context and evaluation decision types.
//!
//! The evaluator consumes a `RequestContext` and produces a `Decision`.
//! Every fact in the context is optional: a condition that reads a missing
//! fact simply does not match.

use std::collections::BTreeSet;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::condition::Os;
use crate::policy::PolicyId;

/// The authenticated user, when known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

/// Device posture reported by the connector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub os: Option<Os>,
    #[serde(default)]
    pub managed: bool,
}

/// Everything the evaluator knows about one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default)]
    pub user: Option<Identity>,
    #[serde(default)]
    pub device: Option<DeviceInfo>,
    #[serde(default)]
    pub source_ip: Option<IpAddr>,
    /// Upper-case alpha-2 code. When absent the evaluator may resolve it
    /// from `source_ip`.
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub destination_ip: Option<IpAddr>,
    #[serde(default)]
    pub destination_sni: Option<String>,
}

impl RequestContext {
    pub fn with_user<I, S>(mut self, email: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user = Some(Identity {
            email: email.into(),
            groups: groups.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn with_device(mut self, os: Option<Os>, managed: bool) -> Self {
        self.device = Some(DeviceInfo { os, managed });
        self
    }

    pub fn with_source_ip(mut self, ip: IpAddr) -> Self {
        self.source_ip = Some(ip);
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_destination_ip(mut self, ip: IpAddr) -> Self {
        self.destination_ip = Some(ip);
        self
    }

    pub fn with_destination_sni(mut self, sni: impl Into<String>) -> Self {
        self.destination_sni = Some(sni.into());
        self
    }
}

/// The final answer for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Deny,
}

/// What happened to one policy during evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PolicyOutcome {
    /// The tree matched the request.
    Matched,
    /// The tree did not match.
    NotMatched,
    /// The policy does not target this request's destination or gateway.
    NotApplicable,
    /// The tree could not be evaluated (corrupt value, unresolvable
    /// destination). Treated as a match for deny/block policies and as a
    /// non-match for allow policies.
    Indeterminate { reason: String },
    /// The policy is invalid for its family (e.g. a `User` condition in a
    /// pre-auth tree) and was not evaluated.
    Rejected { reason: String },
}

/// One line of the evaluation trace, in visit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTrace {
    pub policy_id: PolicyId,
    pub name: String,
    pub priority: i32,
    #[serde(flatten)]
    pub outcome: PolicyOutcome,
}

/// The evaluator's decision for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub verdict: Verdict,
    /// The policy that decided, or `None` when the default applied.
    pub policy_id: Option<PolicyId>,
    pub policy_name: Option<String>,
    pub reason: String,
    pub trace: Vec<PolicyTrace>,
}

impl Decision {
    /// Return true when no policy decided and the family default applied.
    pub fn is_default(&self) -> bool {
        self.policy_id.is_none()
    }
}
