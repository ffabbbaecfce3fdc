//! Reference `PolicyEvaluator` implementation.
//!
//! `TreeEvaluator` reads the current `PolicySnapshot` and resolves a request
//! against one policy family.
//!
//! Evaluation algorithm:
//!
//! 1. Visit enabled policies in ascending priority (ties by id).
//! 2. Skip (`NotApplicable`) access policies not deployed to this gateway or
//!    not targeting the request's destination; skip (`Rejected`) sign-in
//!    policies whose tree uses a condition type foreign to their stage.
//! 3. Evaluate the tree. `Unknown` becomes `Indeterminate`, which counts as
//!    a match for deny/block policies and a non-match for allow policies.
//! 4. Resolve with the configured strategy. If nothing applies, the family
//!    default from `EngineConfig` is returned.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, warn};

use ztna_contracts::{
    context::{Decision, PolicyOutcome, PolicyTrace, RequestContext, Verdict},
    error::ZtnaResult,
    policy::{AccessPolicy, DestinationRef, Effect, SignInPolicy, Stage},
};
use ztna_core::{
    traits::{ApplicationDirectory, Envelope, GeoIpResolver, NoopGeoIpResolver, PolicyEvaluator},
    validate::parse_ipv4_cidr,
};

use crate::{
    config::{EngineConfig, Resolution},
    snapshot::SnapshotHandle,
    tree::{as_ipv4, evaluate_tree, Facts, Truth},
};

/// Whether an access policy targets the request's destination.
enum Targets {
    Yes,
    No,
    Unknown(String),
}

/// Evaluates condition trees from a shared snapshot.
///
/// ```rust,ignore
/// let handle = Arc::new(SnapshotHandle::new(PolicySnapshot::from_bundle(&bundle)));
/// let evaluator = TreeEvaluator::new(EngineConfig::default(), handle, Arc::new(apps));
/// let decision = evaluator.evaluate_access(&ctx)?;
/// ```
pub struct TreeEvaluator {
    config: EngineConfig,
    snapshots: Arc<SnapshotHandle>,
    applications: Arc<dyn ApplicationDirectory>,
    geoip: Arc<dyn GeoIpResolver>,
}

impl TreeEvaluator {
    pub fn new(
        config: EngineConfig,
        snapshots: Arc<SnapshotHandle>,
        applications: Arc<dyn ApplicationDirectory>,
    ) -> Self {
        Self {
            config,
            snapshots,
            applications,
            geoip: Arc::new(NoopGeoIpResolver),
        }
    }

    /// Resolve countries from source addresses when the context has none.
    pub fn with_geoip(mut self, geoip: Arc<dyn GeoIpResolver>) -> Self {
        self.geoip = geoip;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn resolve_country(&self, ctx: &RequestContext) -> Option<String> {
        if let Some(country) = ctx.country.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            return Some(country.to_ascii_uppercase());
        }
        let ip = ctx.source_ip?;
        let country = self.geoip.lookup_country(ip)?;
        debug!(source_ip = %ip, country = %country, "country resolved by GeoIP");
        Some(country.to_ascii_uppercase())
    }

    fn targets(&self, policy: &AccessPolicy, ctx: &RequestContext) -> Targets {
        match policy.destination() {
            DestinationRef::Any => Targets::Yes,
            DestinationRef::Cidr(cidr) => match parse_ipv4_cidr(cidr) {
                Ok(net) => bool_target(
                    ctx.destination_ip
                        .and_then(as_ipv4)
                        .is_some_and(|ip| net.contains(&ip)),
                ),
                Err(reason) => Targets::Unknown(reason),
            },
            DestinationRef::Sni(pattern) => bool_target(
                ctx.destination_sni
                    .as_deref()
                    .is_some_and(|sni| sni_matches(pattern, sni)),
            ),
            DestinationRef::App(app_id) => match self.applications.resolve(app_id) {
                Some(app) => app_targets(&app.cidrs, ctx.destination_ip),
                None => Targets::Unknown(format!("application '{app_id}' not found")),
            },
            DestinationRef::Missing(kind) => Targets::Unknown(format!(
                "destination_type '{kind}' has no destination value"
            )),
        }
    }

    fn access_outcome(&self, policy: &AccessPolicy, facts: &Facts<'_>) -> PolicyOutcome {
        if !policy.deployed_to(self.config.node_id.as_deref()) {
            return PolicyOutcome::NotApplicable;
        }
        match self.targets(policy, facts.ctx) {
            Targets::No => PolicyOutcome::NotApplicable,
            Targets::Unknown(reason) => PolicyOutcome::Indeterminate { reason },
            Targets::Yes => tree_outcome(evaluate_tree(&policy.root_node, facts)),
        }
    }

    fn sign_in_outcome(&self, policy: &SignInPolicy, facts: &Facts<'_>) -> PolicyOutcome {
        if let Some(foreign) = policy
            .root_node
            .conditions()
            .into_iter()
            .find(|c| !policy.stage.allows(c.kind))
        {
            let reason = format!(
                "condition type '{}' is not allowed in a {} policy",
                foreign.kind, policy.stage
            );
            warn!(
                policy_id = %policy.id,
                policy = %policy.name,
                reason = %reason,
                "rejecting sign-in policy that violates its stage"
            );
            return PolicyOutcome::Rejected { reason };
        }
        tree_outcome(evaluate_tree(&policy.root_node, facts))
    }

    /// Visit `policies` in order and resolve one decision.
    fn resolve<'p, P: Envelope>(
        &self,
        family: &str,
        policies: impl Iterator<Item = &'p P>,
        default: Verdict,
        mut outcome_of: impl FnMut(&P) -> PolicyOutcome,
        verdict_of: impl Fn(&P) -> Verdict,
    ) -> Decision {
        let mut trace = Vec::new();
        let mut first_allow: Option<(&P, String)> = None;

        for policy in policies {
            let outcome = outcome_of(policy);
            let verdict = verdict_of(policy);
            let applies = match &outcome {
                PolicyOutcome::Matched => Some(format!(
                    "matched {family} policy '{}' (priority {})",
                    policy.name(),
                    policy.priority()
                )),
                PolicyOutcome::Indeterminate { reason } if verdict == Verdict::Deny => {
                    warn!(
                        policy_id = %policy.id(),
                        policy = %policy.name(),
                        reason = %reason,
                        "policy could not be evaluated; failing closed"
                    );
                    Some(format!(
                        "{family} policy '{}' could not be evaluated; failing closed: {reason}",
                        policy.name()
                    ))
                }
                PolicyOutcome::Indeterminate { reason } => {
                    warn!(
                        policy_id = %policy.id(),
                        policy = %policy.name(),
                        reason = %reason,
                        "allow policy could not be evaluated; skipping"
                    );
                    None
                }
                _ => None,
            };

            debug!(
                family,
                policy_id = %policy.id(),
                priority = policy.priority(),
                outcome = ?outcome,
                "policy visited"
            );
            trace.push(PolicyTrace {
                policy_id: policy.id().clone(),
                name: policy.name().to_string(),
                priority: policy.priority(),
                outcome,
            });

            let Some(reason) = applies else {
                continue;
            };
            match self.config.resolution {
                Resolution::FirstMatch => {
                    return decided(verdict, policy, reason, trace);
                }
                Resolution::DenyOverrides if verdict == Verdict::Deny => {
                    return decided(verdict, policy, reason, trace);
                }
                Resolution::DenyOverrides => {
                    if first_allow.is_none() {
                        first_allow = Some((policy, reason));
                    }
                }
            }
        }

        if let Some((policy, reason)) = first_allow {
            return decided(Verdict::Allow, policy, reason, trace);
        }

        debug!(family, verdict = ?default, "no policy applied; using default");
        Decision {
            verdict: default,
            policy_id: None,
            policy_name: None,
            reason: format!("no {family} policy matched; default {}", verdict_word(default)),
            trace,
        }
    }
}

impl PolicyEvaluator for TreeEvaluator {
    fn evaluate_access(&self, ctx: &RequestContext) -> ZtnaResult<Decision> {
        let snapshot = self.snapshots.current()?;
        let country = self.resolve_country(ctx);
        let facts = Facts::new(ctx, country.as_deref(), self.config.vacuous_or);

        Ok(self.resolve(
            "access",
            snapshot.access().iter(),
            self.config.access_default,
            |policy: &AccessPolicy| self.access_outcome(policy, &facts),
            |policy: &AccessPolicy| match policy.effect {
                Effect::Allow => Verdict::Allow,
                Effect::Deny => Verdict::Deny,
            },
        ))
    }

    fn evaluate_sign_in(&self, stage: Stage, ctx: &RequestContext) -> ZtnaResult<Decision> {
        let snapshot = self.snapshots.current()?;
        let country = self.resolve_country(ctx);
        let facts = Facts::new(ctx, country.as_deref(), self.config.vacuous_or);

        Ok(self.resolve(
            "sign-in",
            snapshot.sign_in().iter().filter(|p| p.stage == stage),
            self.config.sign_in_default,
            |policy: &SignInPolicy| self.sign_in_outcome(policy, &facts),
            |policy: &SignInPolicy| {
                if policy.block {
                    Verdict::Deny
                } else {
                    Verdict::Allow
                }
            },
        ))
    }
}

fn decided<P: Envelope>(
    verdict: Verdict,
    policy: &P,
    reason: String,
    trace: Vec<PolicyTrace>,
) -> Decision {
    Decision {
        verdict,
        policy_id: Some(policy.id().clone()),
        policy_name: Some(policy.name().to_string()),
        reason,
        trace,
    }
}

fn tree_outcome(truth: Truth) -> PolicyOutcome {
    match truth {
        Truth::True => PolicyOutcome::Matched,
        Truth::False => PolicyOutcome::NotMatched,
        Truth::Unknown(reason) => PolicyOutcome::Indeterminate { reason },
    }
}

fn verdict_word(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Allow => "allow",
        Verdict::Deny => "deny",
    }
}

fn bool_target(b: bool) -> Targets {
    if b {
        Targets::Yes
    } else {
        Targets::No
    }
}

fn app_targets(cidrs: &[String], destination: Option<IpAddr>) -> Targets {
    let Some(ip) = destination.and_then(as_ipv4) else {
        return Targets::No;
    };
    let mut corrupt = None;
    for cidr in cidrs {
        match parse_ipv4_cidr(cidr.trim()) {
            Ok(net) if net.contains(&ip) => return Targets::Yes,
            Ok(_) => {}
            Err(reason) => {
                corrupt.get_or_insert(reason);
            }
        }
    }
    corrupt.map_or(Targets::No, Targets::Unknown)
}

/// Match a destination SNI against a policy pattern. `*.example.com`
/// matches any subdomain of `example.com` but not the apex.
fn sni_matches(pattern: &str, sni: &str) -> bool {
    let pattern = pattern.trim().trim_end_matches('.').to_ascii_lowercase();
    let sni = sni.trim().trim_end_matches('.').to_ascii_lowercase();
    match pattern.strip_prefix("*.") {
        Some(parent) => sni
            .strip_suffix(parent)
            .is_some_and(|rest| rest.len() > 1 && rest.ends_with('.')),
        None => pattern == sni,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sni_exact_and_wildcard() {
        assert!(sni_matches("git.example.com", "GIT.example.com."));
        assert!(!sni_matches("git.example.com", "wiki.example.com"));
        assert!(sni_matches("*.example.com", "git.example.com"));
        assert!(sni_matches("*.example.com", "a.b.example.com"));
        assert!(!sni_matches("*.example.com", "example.com"));
        assert!(!sni_matches("*.example.com", "badexample.com"));
    }

    #[test]
    fn app_targets_fails_closed_on_corrupt_cidr_only_without_match() {
        let ip: IpAddr = "10.0.0.5".parse().unwrap();
        let cidrs = vec!["bogus".to_string(), "10.0.0.0/24".to_string()];
        assert!(matches!(app_targets(&cidrs, Some(ip)), Targets::Yes));

        let cidrs = vec!["bogus".to_string(), "192.168.0.0/24".to_string()];
        assert!(matches!(app_targets(&cidrs, Some(ip)), Targets::Unknown(_)));

        assert!(matches!(app_targets(&cidrs, None), Targets::No));
    }
}
