//! Access policy compilation.
//!
//! Compilation turns each enabled access policy deployed to a gateway into
//! one rule per alternative of its tree's disjunctive normal form:
//!
//! ```text
//! User in_group eng AND (Device os linux OR Device os darwin)
//!   => [Identity=group:eng, DeviceOS=linux]
//!      [Identity=group:eng, DeviceOS=darwin]
//! ```
//!
//! Expansion is bounded by `CompileOptions::max_terms`.
//!
//! Gateways see the same answer the reference evaluator gives. A condition
//! the compiler cannot interpret (corrupt CIDR, unknown country, operator
//! foreign to its type) is read as true in a deny policy and as false in an
//! allow policy, which is where three-valued evaluation lands: a deny
//! applies when its tree is true or unknown, an allow only when it is true.
//! A deny policy whose destination cannot be resolved is widened to every
//! source and [`ANY_DESTINATION`]; an allow policy in that state is dropped.
//! Envelope metadata such as the name is never consulted.

use tracing::{debug, warn};

use ztna_contracts::{
    condition::{Condition, ConditionOp},
    error::{ZtnaError, ZtnaResult},
    node::{Operator, PolicyNode},
    policy::{AccessPolicy, DestinationRef, Effect},
};
use ztna_core::{
    traits::ApplicationDirectory,
    validate::{check_value, parse_ipv4_cidr},
};

use crate::{
    hash::config_hash,
    rule::{DestinationTagType, GatewayConfig, GatewayRule, RuleAction, SourceTag, SourceTagType},
};

/// Destination used when a deny policy's own destination cannot be resolved.
pub const ANY_DESTINATION: &str = "0.0.0.0/0";

pub const DEFAULT_MAX_TERMS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// The gateway being compiled for. Policies restricted to other
    /// gateways are skipped.
    pub node_id: Option<String>,
    /// Whether an OR branch with no children matches every client.
    pub vacuous_or: bool,
    /// Upper bound on rules produced from a single policy.
    pub max_terms: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            node_id: None,
            vacuous_or: true,
            max_terms: DEFAULT_MAX_TERMS,
        }
    }
}

/// A conjunction of source tags.
type Term = Vec<SourceTag>;

/// Where a policy sends traffic, as far as the gateway can tell.
enum Target {
    Known(DestinationTagType, String),
    /// An application with no addresses: the policy reaches nothing.
    Nowhere,
    Unknown(String),
}

/// Compile `policies` into the rule set for one gateway.
///
/// Disabled policies and policies not deployed to `options.node_id` are
/// skipped. Rules are ordered by ascending priority, ties by policy id.
///
/// Returns `ZtnaError::CompileError` when a policy's tree expands to more
/// than `options.max_terms` alternatives.
pub fn compile(
    policies: &[AccessPolicy],
    applications: &dyn ApplicationDirectory,
    options: &CompileOptions,
) -> ZtnaResult<GatewayConfig> {
    let mut ordered: Vec<&AccessPolicy> = policies
        .iter()
        .filter(|p| p.enabled && p.deployed_to(options.node_id.as_deref()))
        .collect();
    ordered.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));

    let mut rules = Vec::new();
    for policy in ordered {
        rules.extend(compile_policy(policy, applications, options)?);
    }

    let config_hash = config_hash(&rules)?;
    debug!(rules = rules.len(), config_hash = %config_hash, "gateway config compiled");
    Ok(GatewayConfig { rules, config_hash })
}

fn compile_policy(
    policy: &AccessPolicy,
    applications: &dyn ApplicationDirectory,
    options: &CompileOptions,
) -> ZtnaResult<Vec<GatewayRule>> {
    let action = match policy.effect {
        Effect::Allow => RuleAction::Allow,
        Effect::Deny => RuleAction::Deny,
    };

    let (destination_tag_type, destination_value) = match (target(policy, applications), action) {
        (Target::Known(tag_type, value), _) => (tag_type, value),
        (Target::Nowhere, _) => return Ok(Vec::new()),
        (Target::Unknown(reason), RuleAction::Allow) => {
            warn!(
                policy_id = %policy.id,
                policy = %policy.name,
                reason = %reason,
                "allow policy destination cannot be resolved; skipping"
            );
            return Ok(Vec::new());
        }
        (Target::Unknown(reason), RuleAction::Deny) => {
            warn!(
                policy_id = %policy.id,
                policy = %policy.name,
                reason = %reason,
                "deny policy destination cannot be resolved; denying every source"
            );
            let widened = rule(
                policy,
                action,
                Vec::new(),
                DestinationTagType::Cidr,
                ANY_DESTINATION,
            );
            return Ok(vec![widened]);
        }
    };

    let uninterpretable_as = action == RuleAction::Deny;
    let conditions = policy.root_node.conditions();
    if let Some(reason) = conditions.iter().find_map(|c| interpret(c).err()) {
        warn!(
            policy_id = %policy.id,
            policy = %policy.name,
            reason = %reason,
            "policy has conditions the gateway cannot match; compiling them as {}",
            uninterpretable_as
        );
    }

    let terms = expand(&policy.root_node, uninterpretable_as, options).map_err(|reason| {
        ZtnaError::CompileError {
            reason: format!("policy '{}': {}", policy.name, reason),
        }
    })?;

    Ok(terms
        .into_iter()
        .map(|sources| rule(policy, action, sources, destination_tag_type, &destination_value))
        .collect())
}

fn rule(
    policy: &AccessPolicy,
    action: RuleAction,
    sources: Term,
    destination_tag_type: DestinationTagType,
    destination_value: &str,
) -> GatewayRule {
    GatewayRule {
        policy_id: policy.id.clone(),
        name: policy.name.clone(),
        action,
        priority: policy.priority,
        sources,
        destination_tag_type,
        destination_value: destination_value.to_string(),
    }
}

fn target(policy: &AccessPolicy, applications: &dyn ApplicationDirectory) -> Target {
    match policy.destination() {
        DestinationRef::Any => Target::Known(DestinationTagType::Cidr, ANY_DESTINATION.to_string()),
        DestinationRef::Cidr(cidr) => match parse_ipv4_cidr(cidr) {
            Ok(_) => Target::Known(DestinationTagType::Cidr, cidr.to_string()),
            Err(reason) => Target::Unknown(reason),
        },
        DestinationRef::Sni(sni) => {
            Target::Known(DestinationTagType::Sni, sni.trim().to_ascii_lowercase())
        }
        DestinationRef::App(app_id) => {
            let Some(app) = applications.resolve(app_id) else {
                return Target::Unknown(format!("application '{app_id}' not found"));
            };
            if app.cidrs.is_empty() {
                return Target::Nowhere;
            }
            let mut cidrs = Vec::with_capacity(app.cidrs.len());
            for cidr in &app.cidrs {
                let cidr = cidr.trim();
                if let Err(reason) = parse_ipv4_cidr(cidr) {
                    return Target::Unknown(format!("application '{app_id}': {reason}"));
                }
                cidrs.push(cidr);
            }
            Target::Known(DestinationTagType::Cidr, cidrs.join(","))
        }
        DestinationRef::Missing(kind) => {
            Target::Unknown(format!("destination_type '{kind}' has no destination value"))
        }
    }
}

/// Expand `node` to disjunctive normal form. Conditions that cannot be
/// interpreted become the constant `uninterpretable_as`.
///
/// An empty result never matches; a result containing an empty term
/// matches every source.
fn expand(
    node: &PolicyNode,
    uninterpretable_as: bool,
    options: &CompileOptions,
) -> Result<Vec<Term>, String> {
    match node {
        PolicyNode::Leaf(condition) => Ok(match interpret(condition) {
            Ok(tag) => vec![vec![tag]],
            Err(_) if uninterpretable_as => vec![Vec::new()],
            Err(_) => Vec::new(),
        }),
        PolicyNode::Branch {
            operator: Operator::Or,
            children,
        } => {
            if children.is_empty() {
                return Ok(if options.vacuous_or { vec![Vec::new()] } else { Vec::new() });
            }
            let mut terms = Vec::new();
            for child in children {
                terms.extend(expand(child, uninterpretable_as, options)?);
                if terms.len() > options.max_terms {
                    return Err(too_many(options));
                }
            }
            Ok(terms)
        }
        PolicyNode::Branch {
            operator: Operator::And,
            children,
        } => {
            let mut terms: Vec<Term> = vec![Vec::new()];
            for child in children {
                let alternatives = expand(child, uninterpretable_as, options)?;
                if terms.len().saturating_mul(alternatives.len()) > options.max_terms {
                    return Err(too_many(options));
                }
                let mut product = Vec::with_capacity(terms.len() * alternatives.len());
                for term in &terms {
                    for alternative in &alternatives {
                        product.push(conjoin(term, alternative));
                    }
                }
                terms = product;
            }
            Ok(terms)
        }
    }
}

fn too_many(options: &CompileOptions) -> String {
    format!(
        "tree expands to more than {} gateway rules; simplify its OR groups",
        options.max_terms
    )
}

fn conjoin(left: &Term, right: &Term) -> Term {
    let mut term = left.clone();
    for tag in right {
        if !term.contains(tag) {
            term.push(tag.clone());
        }
    }
    term
}

/// Map a condition to the source tag the gateway matches on, or explain why
/// it has no meaning. The stored `field` is not consulted.
fn interpret(condition: &Condition) -> Result<SourceTag, String> {
    if !condition.kind.allows(condition.op) {
        return Err(format!(
            "operator '{}' is not valid for condition type '{}'",
            condition.op, condition.kind
        ));
    }
    let value = condition.value.trim();
    check_value(condition.op, value)?;

    let tag = match condition.op {
        ConditionOp::InGroup => {
            let group = if value.starts_with("group:") {
                value.to_string()
            } else {
                format!("group:{value}")
            };
            SourceTag::new(SourceTagType::Identity, group)
        }
        ConditionOp::Is => SourceTag::new(SourceTagType::User, value.to_ascii_lowercase()),
        ConditionOp::EmailSuffix => {
            let domain = value.trim_start_matches('@').to_ascii_lowercase();
            if domain.is_empty() {
                return Err("email_suffix condition has an empty domain".to_string());
            }
            SourceTag::new(SourceTagType::EmailSuffix, domain)
        }
        ConditionOp::Cidr => SourceTag::new(SourceTagType::SourceCidr, value),
        ConditionOp::Country => SourceTag::new(SourceTagType::Country, value),
        ConditionOp::IsPrivate => SourceTag::new(SourceTagType::PrivateSource, "true"),
        ConditionOp::Os => SourceTag::new(SourceTagType::DeviceOs, value),
        ConditionOp::Managed => SourceTag::new(SourceTagType::DeviceManaged, "true"),
    };
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::IpAddr;
    use std::sync::Arc;

    use ztna_contracts::{
        condition::Os,
        context::{RequestContext, Verdict},
        policy::{Application, DestinationType, PolicyId},
    };
    use ztna_core::traits::PolicyEvaluator;
    use ztna_policy::{EngineConfig, PolicySnapshot, SnapshotHandle, TreeEvaluator};

    use super::*;

    #[derive(Default)]
    struct Apps(HashMap<String, Application>);

    impl ApplicationDirectory for Apps {
        fn resolve(&self, id: &str) -> Option<Application> {
            self.0.get(id).cloned()
        }
    }

    fn leaf(op: ConditionOp, value: &str) -> PolicyNode {
        PolicyNode::leaf(Condition::new(op, value))
    }

    fn policy(id: &str, priority: i32, effect: Effect, tree: PolicyNode) -> AccessPolicy {
        let mut p = AccessPolicy::new(id, priority);
        p.id = PolicyId::from(id);
        p.effect = effect;
        p.destination_type = DestinationType::Cidr;
        p.destination_cidr = Some("10.10.0.0/16".to_string());
        p.root_node = tree;
        p
    }

    fn eng_on_workstation() -> PolicyNode {
        PolicyNode::branch(
            Operator::And,
            vec![
                leaf(ConditionOp::InGroup, "eng"),
                PolicyNode::branch(
                    Operator::Or,
                    vec![leaf(ConditionOp::Os, "linux"), leaf(ConditionOp::Os, "darwin")],
                ),
            ],
        )
    }

    fn tags(rule: &GatewayRule) -> Vec<String> {
        rule.sources.iter().map(ToString::to_string).collect()
    }

    // ── DNF expansion ────────────────────────────────────────────────────────

    #[test]
    fn and_over_or_distributes() {
        let config = compile(
            &[policy("eng", 100, Effect::Allow, eng_on_workstation())],
            &Apps::default(),
            &CompileOptions::default(),
        )
        .unwrap();

        assert_eq!(config.rules.len(), 2);
        assert_eq!(tags(&config.rules[0]), vec!["Identity=group:eng", "DeviceOS=linux"]);
        assert_eq!(tags(&config.rules[1]), vec!["Identity=group:eng", "DeviceOS=darwin"]);
        assert!(config.rules.iter().all(|r| r.destination_value == "10.10.0.0/16"));
    }

    #[test]
    fn empty_tree_matches_every_source() {
        let config = compile(
            &[policy("open", 100, Effect::Allow, PolicyNode::empty())],
            &Apps::default(),
            &CompileOptions::default(),
        )
        .unwrap();
        assert_eq!(config.rules.len(), 1);
        assert!(config.rules[0].sources.is_empty());
    }

    #[test]
    fn empty_or_follows_vacuous_option() {
        let tree = PolicyNode::branch(Operator::Or, vec![]);
        let options = CompileOptions {
            vacuous_or: false,
            ..CompileOptions::default()
        };
        let config = compile(
            &[policy("never", 100, Effect::Allow, tree)],
            &Apps::default(),
            &options,
        )
        .unwrap();
        assert!(config.rules.is_empty());
        assert_eq!(config.config_hash, "empty");
    }

    #[test]
    fn duplicate_tags_are_merged() {
        let tree = PolicyNode::branch(
            Operator::And,
            vec![leaf(ConditionOp::Managed, ""), leaf(ConditionOp::Managed, "")],
        );
        let config = compile(
            &[policy("dup", 100, Effect::Allow, tree)],
            &Apps::default(),
            &CompileOptions::default(),
        )
        .unwrap();
        assert_eq!(tags(&config.rules[0]), vec!["DeviceManaged=true"]);
    }

    #[test]
    fn expansion_is_bounded() {
        let or_pair = || {
            PolicyNode::branch(
                Operator::Or,
                vec![leaf(ConditionOp::Os, "linux"), leaf(ConditionOp::Os, "darwin")],
            )
        };
        // 2^7 = 128 alternatives
        let tree = PolicyNode::branch(Operator::And, (0..7).map(|_| or_pair()).collect());
        let err = compile(
            &[policy("huge", 100, Effect::Allow, tree)],
            &Apps::default(),
            &CompileOptions::default(),
        )
        .unwrap_err();
        match err {
            ZtnaError::CompileError { reason } => assert!(reason.contains("huge")),
            other => panic!("expected CompileError, got {other:?}"),
        }
    }

    // ── Tags and destinations ────────────────────────────────────────────────

    #[test]
    fn condition_values_are_normalised() {
        let tree = PolicyNode::branch(
            Operator::And,
            vec![
                leaf(ConditionOp::InGroup, "group:ops"),
                leaf(ConditionOp::EmailSuffix, "@Example.COM"),
                leaf(ConditionOp::Country, "DE"),
                leaf(ConditionOp::IsPrivate, ""),
            ],
        );
        let config = compile(
            &[policy("tags", 100, Effect::Allow, tree)],
            &Apps::default(),
            &CompileOptions::default(),
        )
        .unwrap();
        assert_eq!(
            tags(&config.rules[0]),
            vec![
                "Identity=group:ops",
                "EmailSuffix=example.com",
                "Country=DE",
                "PrivateSource=true"
            ]
        );
    }

    #[test]
    fn app_destination_joins_cidrs() {
        let mut apps = Apps::default();
        apps.0.insert(
            "gitlab".to_string(),
            Application {
                id: "gitlab".to_string(),
                name: "GitLab".to_string(),
                description: String::new(),
                cidrs: vec!["10.1.0.0/24".to_string(), "10.2.0.0/24".to_string()],
            },
        );
        let mut p = policy("git", 100, Effect::Allow, PolicyNode::empty());
        p.destination_type = DestinationType::App;
        p.destination_app_id = Some("gitlab".to_string());

        let config = compile(&[p], &apps, &CompileOptions::default()).unwrap();
        assert_eq!(config.rules[0].destination_tag_type, DestinationTagType::Cidr);
        assert_eq!(config.rules[0].destination_value, "10.1.0.0/24,10.2.0.0/24");
    }

    #[test]
    fn unresolvable_app_drops_allow_and_widens_deny() {
        let mut allow = policy("allow-app", 100, Effect::Allow, eng_on_workstation());
        allow.destination_type = DestinationType::App;
        allow.destination_app_id = Some("gone".to_string());
        let mut deny = allow.clone();
        deny.id = PolicyId::from("deny-app");
        deny.effect = Effect::Deny;

        let config = compile(&[allow, deny], &Apps::default(), &CompileOptions::default()).unwrap();
        assert_eq!(config.rules.len(), 1);
        let rule = &config.rules[0];
        assert_eq!(rule.action, RuleAction::Deny);
        assert!(rule.sources.is_empty());
        assert_eq!(rule.destination_value, ANY_DESTINATION);
    }

    #[test]
    fn corrupt_leaf_alone_denies_every_source_on_own_destination() {
        let deny = policy("bad-deny", 100, Effect::Deny, leaf(ConditionOp::Cidr, "10.0.0.0/99"));
        let config = compile(&[deny], &Apps::default(), &CompileOptions::default()).unwrap();
        assert_eq!(config.rules.len(), 1);
        assert!(config.rules[0].sources.is_empty());
        assert_eq!(config.rules[0].destination_value, "10.10.0.0/16");
    }

    #[test]
    fn corrupt_leaf_keeps_deny_siblings() {
        let tree = PolicyNode::branch(
            Operator::And,
            vec![
                leaf(ConditionOp::InGroup, "contractors"),
                leaf(ConditionOp::Cidr, "10.0.0.0/99"),
            ],
        );
        let config = compile(
            &[policy("contractors", 100, Effect::Deny, tree)],
            &Apps::default(),
            &CompileOptions::default(),
        )
        .unwrap();
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].action, RuleAction::Deny);
        assert_eq!(tags(&config.rules[0]), vec!["Identity=group:contractors"]);
        assert_eq!(config.rules[0].destination_value, "10.10.0.0/16");
    }

    #[test]
    fn corrupt_leaf_never_grants_access() {
        let either = PolicyNode::branch(
            Operator::Or,
            vec![leaf(ConditionOp::InGroup, "eng"), leaf(ConditionOp::Country, "XX")],
        );
        let both = PolicyNode::branch(
            Operator::And,
            vec![leaf(ConditionOp::InGroup, "eng"), leaf(ConditionOp::Os, "plan9")],
        );
        let config = compile(
            &[
                policy("either", 100, Effect::Allow, either),
                policy("both", 200, Effect::Allow, both),
            ],
            &Apps::default(),
            &CompileOptions::default(),
        )
        .unwrap();
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].name, "either");
        assert_eq!(tags(&config.rules[0]), vec!["Identity=group:eng"]);
    }

    #[test]
    fn envelope_metadata_does_not_widen() {
        let mut deny = policy("blank", 100, Effect::Deny, leaf(ConditionOp::InGroup, "eng"));
        deny.name = " ".to_string();
        deny.node_ids.insert(String::new());
        deny.node_ids.insert("gw-eu-1".to_string());

        let options = CompileOptions {
            node_id: Some("gw-eu-1".to_string()),
            ..CompileOptions::default()
        };
        let config = compile(&[deny], &Apps::default(), &options).unwrap();
        assert_eq!(config.rules.len(), 1);
        assert_eq!(tags(&config.rules[0]), vec!["Identity=group:eng"]);
        assert_eq!(config.rules[0].destination_value, "10.10.0.0/16");
    }

    #[test]
    fn corrupt_destination_cidr_widens_deny() {
        let mut deny = policy("bad-dest", 100, Effect::Deny, leaf(ConditionOp::InGroup, "eng"));
        deny.destination_cidr = Some("10.10.0.0/99".to_string());
        let config = compile(&[deny], &Apps::default(), &CompileOptions::default()).unwrap();
        assert_eq!(config.rules.len(), 1);
        assert!(config.rules[0].sources.is_empty());
        assert_eq!(config.rules[0].destination_value, ANY_DESTINATION);
    }

    #[test]
    fn app_without_addresses_compiles_to_nothing() {
        let mut apps = Apps::default();
        apps.0.insert(
            "empty".to_string(),
            Application {
                id: "empty".to_string(),
                name: "Empty".to_string(),
                description: String::new(),
                cidrs: vec![],
            },
        );
        let mut deny = policy("nowhere", 100, Effect::Deny, PolicyNode::empty());
        deny.destination_type = DestinationType::App;
        deny.destination_app_id = Some("empty".to_string());

        let config = compile(&[deny], &apps, &CompileOptions::default()).unwrap();
        assert!(config.rules.is_empty());
    }

    // ── Agreement with the evaluator ─────────────────────────────────────────

    /// First-match reading of a rule list, the way a gateway applies it.
    /// No match falls through to deny.
    fn gateway_verdict(config: &GatewayConfig, ctx: &RequestContext) -> Verdict {
        match config.rules.iter().find(|r| rule_matches(r, ctx)) {
            Some(rule) if rule.action == RuleAction::Allow => Verdict::Allow,
            _ => Verdict::Deny,
        }
    }

    fn rule_matches(rule: &GatewayRule, ctx: &RequestContext) -> bool {
        let destination = match rule.destination_tag_type {
            DestinationTagType::Cidr => match ctx.destination_ip {
                Some(IpAddr::V4(ip)) => rule
                    .destination_value
                    .split(',')
                    .any(|cidr| parse_ipv4_cidr(cidr).is_ok_and(|net| net.contains(&ip))),
                _ => false,
            },
            DestinationTagType::Sni => ctx
                .destination_sni
                .as_deref()
                .is_some_and(|sni| sni.eq_ignore_ascii_case(&rule.destination_value)),
        };
        destination && rule.sources.iter().all(|tag| source_matches(tag, ctx))
    }

    fn source_matches(tag: &SourceTag, ctx: &RequestContext) -> bool {
        match tag.tag_type {
            SourceTagType::Identity => {
                let group = tag.value.trim_start_matches("group:");
                ctx.user.as_ref().is_some_and(|u| u.groups.contains(group))
            }
            SourceTagType::SourceCidr => match ctx.source_ip {
                Some(IpAddr::V4(ip)) => {
                    parse_ipv4_cidr(&tag.value).is_ok_and(|net| net.contains(&ip))
                }
                _ => false,
            },
            SourceTagType::DeviceOs => ctx
                .device
                .as_ref()
                .and_then(|d| d.os)
                .is_some_and(|os| os.as_str() == tag.value),
            SourceTagType::DeviceManaged => ctx.device.as_ref().is_some_and(|d| d.managed),
            other => panic!("no matcher for {other} tags"),
        }
    }

    #[test]
    fn compiled_rules_agree_with_evaluator() {
        let contractors = policy(
            "contractors",
            100,
            Effect::Deny,
            PolicyNode::branch(
                Operator::And,
                vec![
                    leaf(ConditionOp::InGroup, "contractors"),
                    leaf(ConditionOp::Cidr, "10.0.0.0/99"),
                ],
            ),
        );

        let mut lab = policy("lab", 150, Effect::Deny, leaf(ConditionOp::InGroup, "eng"));
        lab.name = " ".to_string();
        lab.destination_cidr = Some("192.168.0.0/16".to_string());

        let mut open = policy(
            "open",
            200,
            Effect::Allow,
            PolicyNode::branch(
                Operator::Or,
                vec![leaf(ConditionOp::InGroup, "eng"), leaf(ConditionOp::Os, "plan9")],
            ),
        );
        open.destination_type = DestinationType::None;
        open.destination_cidr = None;

        let policies = vec![contractors, lab, open];
        let config = compile(&policies, &Apps::default(), &CompileOptions::default()).unwrap();
        let evaluator = TreeEvaluator::new(
            EngineConfig::default(),
            Arc::new(SnapshotHandle::new(PolicySnapshot::new(policies, vec![]))),
            Arc::new(Apps::default()),
        );

        let eng = || {
            RequestContext::default()
                .with_user("alice@example.com", ["eng"])
                .with_device(Some(Os::Linux), true)
                .with_source_ip("10.1.2.3".parse().unwrap())
        };
        let contractor = || {
            RequestContext::default()
                .with_user("bob@vendor.example", ["contractors"])
                .with_source_ip("10.1.2.4".parse().unwrap())
        };
        let requests = [
            eng().with_destination_ip("8.8.8.8".parse().unwrap()),
            eng().with_destination_ip("10.10.0.5".parse().unwrap()),
            eng().with_destination_ip("192.168.1.1".parse().unwrap()),
            contractor().with_destination_ip("10.10.0.5".parse().unwrap()),
            contractor().with_destination_ip("8.8.8.8".parse().unwrap()),
        ];

        let expected = [
            Verdict::Allow,
            Verdict::Allow,
            Verdict::Deny,
            Verdict::Deny,
            Verdict::Deny,
        ];
        for (ctx, expected) in requests.iter().zip(expected) {
            let decision = evaluator.evaluate_access(ctx).unwrap();
            assert_eq!(decision.verdict, expected, "evaluator on {ctx:?}");
            assert_eq!(gateway_verdict(&config, ctx), expected, "gateway on {ctx:?}");
        }
    }

    // ── Selection and ordering ───────────────────────────────────────────────

    #[test]
    fn disabled_and_foreign_gateway_policies_are_skipped() {
        let mut off = policy("off", 100, Effect::Allow, PolicyNode::empty());
        off.enabled = false;
        let mut elsewhere = policy("elsewhere", 200, Effect::Allow, PolicyNode::empty());
        elsewhere.node_ids.insert("gw-us-1".to_string());
        let here = policy("here", 300, Effect::Allow, PolicyNode::empty());

        let options = CompileOptions {
            node_id: Some("gw-eu-1".to_string()),
            ..CompileOptions::default()
        };
        let config = compile(&[off, elsewhere, here], &Apps::default(), &options).unwrap();
        let names: Vec<&str> = config.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["here"]);
    }

    #[test]
    fn rules_follow_priority_order() {
        let config = compile(
            &[
                policy("c", 300, Effect::Allow, PolicyNode::empty()),
                policy("a", 100, Effect::Deny, PolicyNode::empty()),
                policy("b", 200, Effect::Allow, PolicyNode::empty()),
            ],
            &Apps::default(),
            &CompileOptions::default(),
        )
        .unwrap();
        let priorities: Vec<i32> = config.rules.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![100, 200, 300]);
        assert_ne!(config.config_hash, "empty");
    }
}
