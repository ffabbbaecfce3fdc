//! Collaborator trait definitions.
//!
//! These traits mark the boundaries the policy model depends on but does
//! not own:
//!
//! - `Envelope`             — common view over access and sign-in policies
//! - `PolicyStore`          — persistence (the REST collaborator)
//! - `ApplicationDirectory` — resolves `destination_app_id` to CIDRs
//! - `GeoIpResolver`        — resolves a source address to a country
//! - `PolicyEvaluator`      — the enforcement contract
//!
//! The reference implementations live in `ztna-store` and `ztna-policy`.

use std::net::IpAddr;

use chrono::{DateTime, Utc};

use ztna_contracts::{
    context::{Decision, RequestContext},
    error::ZtnaResult,
    node::PolicyNode,
    policy::{AccessPolicy, Application, PolicyId, SignInPolicy, Stage},
    validation::ValidationReport,
};

use crate::validate::{validate_access_policy, validate_sign_in_policy};

/// The fields every policy family shares, so stores and snapshots can be
/// written once for both.
pub trait Envelope: Clone + Send + Sync + 'static {
    /// Family name used in logs and error messages ("access", "sign-in").
    const FAMILY: &'static str;

    fn id(&self) -> &PolicyId;
    fn set_id(&mut self, id: PolicyId);
    fn name(&self) -> &str;
    fn priority(&self) -> i32;
    fn enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);
    fn version(&self) -> u64;
    /// Record a successful save: new version and timestamp.
    fn stamp(&mut self, version: u64, at: DateTime<Utc>);
    fn root_node(&self) -> &PolicyNode;

    /// Run every structural, value and targeting check for this family.
    fn validate(&self) -> ValidationReport;
}

impl Envelope for AccessPolicy {
    const FAMILY: &'static str = "access";

    fn id(&self) -> &PolicyId {
        &self.id
    }

    fn set_id(&mut self, id: PolicyId) {
        self.id = id;
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn stamp(&mut self, version: u64, at: DateTime<Utc>) {
        self.version = version;
        self.updated_at = Some(at);
    }

    fn root_node(&self) -> &PolicyNode {
        &self.root_node
    }

    fn validate(&self) -> ValidationReport {
        validate_access_policy(self)
    }
}

impl Envelope for SignInPolicy {
    const FAMILY: &'static str = "sign-in";

    fn id(&self) -> &PolicyId {
        &self.id
    }

    fn set_id(&mut self, id: PolicyId) {
        self.id = id;
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn stamp(&mut self, version: u64, at: DateTime<Utc>) {
        self.version = version;
        self.updated_at = Some(at);
    }

    fn root_node(&self) -> &PolicyNode {
        &self.root_node
    }

    fn validate(&self) -> ValidationReport {
        validate_sign_in_policy(self)
    }
}

/// Persistence for one policy family.
///
/// Saves are atomic: an envelope is validated and written as a whole or not
/// at all. Implementations must not retry on failure.
pub trait PolicyStore<P: Envelope>: Send + Sync {
    /// Every stored policy, ascending by priority.
    fn list(&self) -> ZtnaResult<Vec<P>>;

    fn get(&self, id: &PolicyId) -> ZtnaResult<P>;

    /// Validate and insert a new policy. The store assigns an id when none
    /// is set and stamps version 1.
    fn create(&self, policy: P) -> ZtnaResult<P>;

    /// Validate and replace a stored policy wholesale.
    ///
    /// `policy.version()` must equal the stored version, otherwise the save
    /// fails with `ZtnaError::VersionConflict` and nothing is written.
    fn update(&self, policy: P) -> ZtnaResult<P>;

    /// Flip only the `enabled` flag. Setting the current value is a no-op.
    fn set_enabled(&self, id: &PolicyId, enabled: bool) -> ZtnaResult<P>;

    fn delete(&self, id: &PolicyId) -> ZtnaResult<()>;
}

/// Looks up applications referenced by `destination_app_id`.
pub trait ApplicationDirectory: Send + Sync {
    /// Return the application with `id`, or `None` if it does not exist.
    fn resolve(&self, id: &str) -> Option<Application>;
}

/// Resolves IP addresses to country codes.
pub trait GeoIpResolver: Send + Sync {
    /// The ISO 3166-1 alpha-2 country code for `ip`, if known.
    fn lookup_country(&self, ip: IpAddr) -> Option<String>;
}

/// Resolver used when no GeoIP database is available.
#[derive(Debug, Default, Clone)]
pub struct NoopGeoIpResolver;

impl GeoIpResolver for NoopGeoIpResolver {
    fn lookup_country(&self, _ip: IpAddr) -> Option<String> {
        None
    }
}

/// The enforcement contract.
///
/// Implementations visit enabled policies in ascending priority, evaluate
/// each tree against the context and resolve to a single `Decision`.
/// Evaluation failures inside a policy must fail closed rather than
/// returning an error; `Err` is reserved for the evaluator itself being
/// unusable.
pub trait PolicyEvaluator: Send + Sync {
    fn evaluate_access(&self, ctx: &RequestContext) -> ZtnaResult<Decision>;

    /// Evaluate only the sign-in policies of `stage`.
    fn evaluate_sign_in(&self, stage: Stage, ctx: &RequestContext) -> ZtnaResult<Decision>;
}
