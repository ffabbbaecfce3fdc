//! Condition tree interpretation.
//!
//! A leaf evaluates to `True`, `False` or `Unknown`. `Unknown` means the
//! stored condition could not be interpreted (a corrupt CIDR, a country
//! outside the vocabulary, an operator foreign to its type). Branches
//! combine children with Kleene logic, so one `Unknown` child only decides
//! the branch when no other child already does.
//!
//! A fact missing from the request context is never `Unknown`: the
//! condition reading it is simply `False`.

use std::net::{IpAddr, Ipv4Addr};

use ztna_contracts::{
    condition::{is_known_country, Condition, ConditionOp, Os},
    context::RequestContext,
    node::{Operator, PolicyNode},
};
use ztna_core::validate::parse_ipv4_cidr;

/// Tri-state result of evaluating a condition or tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    /// Carries the first reason the tree could not be interpreted.
    Unknown(String),
}

impl Truth {
    pub fn is_true(&self) -> bool {
        matches!(self, Self::True)
    }

    fn from_bool(b: bool) -> Self {
        if b {
            Self::True
        } else {
            Self::False
        }
    }
}

/// The request facts a tree is evaluated against, with the country already
/// resolved.
#[derive(Debug, Clone, Copy)]
pub struct Facts<'a> {
    pub ctx: &'a RequestContext,
    /// Upper-case alpha-2 code from the context or a GeoIP lookup.
    pub country: Option<&'a str>,
    /// Whether an OR branch with no children matches.
    pub vacuous_or: bool,
}

impl<'a> Facts<'a> {
    pub fn new(ctx: &'a RequestContext, country: Option<&'a str>, vacuous_or: bool) -> Self {
        Self {
            ctx,
            country,
            vacuous_or,
        }
    }
}

/// Map an address to IPv4, unwrapping IPv4-mapped IPv6 addresses.
pub fn as_ipv4(ip: IpAddr) -> Option<Ipv4Addr> {
    match ip {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}

pub fn evaluate_tree(node: &PolicyNode, facts: &Facts<'_>) -> Truth {
    match node {
        PolicyNode::Leaf(condition) => evaluate_condition(condition, facts),
        PolicyNode::Branch { operator, children } => match operator {
            Operator::And => evaluate_and(children, facts),
            Operator::Or => evaluate_or(children, facts),
        },
    }
}

fn evaluate_and(children: &[PolicyNode], facts: &Facts<'_>) -> Truth {
    let mut unknown = None;
    for child in children {
        match evaluate_tree(child, facts) {
            Truth::False => return Truth::False,
            Truth::Unknown(reason) => {
                unknown.get_or_insert(reason);
            }
            Truth::True => {}
        }
    }
    unknown.map_or(Truth::True, Truth::Unknown)
}

fn evaluate_or(children: &[PolicyNode], facts: &Facts<'_>) -> Truth {
    if children.is_empty() {
        return Truth::from_bool(facts.vacuous_or);
    }
    let mut unknown = None;
    for child in children {
        match evaluate_tree(child, facts) {
            Truth::True => return Truth::True,
            Truth::Unknown(reason) => {
                unknown.get_or_insert(reason);
            }
            Truth::False => {}
        }
    }
    unknown.map_or(Truth::False, Truth::Unknown)
}

/// Evaluate a single condition as a predicate over `facts`.
pub fn evaluate_condition(condition: &Condition, facts: &Facts<'_>) -> Truth {
    if !condition.kind.allows(condition.op) {
        return Truth::Unknown(format!(
            "operator '{}' is not valid for condition type '{}'",
            condition.op, condition.kind
        ));
    }

    let ctx = facts.ctx;
    let value = condition.value.trim();
    match condition.op {
        ConditionOp::InGroup => {
            if value.is_empty() {
                return Truth::Unknown("in_group condition has an empty group".to_string());
            }
            Truth::from_bool(ctx.user.as_ref().is_some_and(|u| u.groups.contains(value)))
        }
        ConditionOp::Is => {
            if value.is_empty() {
                return Truth::Unknown("is condition has an empty email".to_string());
            }
            Truth::from_bool(
                ctx.user
                    .as_ref()
                    .is_some_and(|u| u.email.trim().eq_ignore_ascii_case(value)),
            )
        }
        ConditionOp::EmailSuffix => {
            let suffix = value.trim_start_matches('@').to_ascii_lowercase();
            if suffix.is_empty() {
                return Truth::Unknown("email_suffix condition has an empty domain".to_string());
            }
            Truth::from_bool(
                ctx.user
                    .as_ref()
                    .is_some_and(|u| email_in_domain(&u.email, &suffix)),
            )
        }
        ConditionOp::Cidr => match parse_ipv4_cidr(value) {
            Ok(net) => Truth::from_bool(
                ctx.source_ip
                    .and_then(as_ipv4)
                    .is_some_and(|ip| net.contains(&ip)),
            ),
            Err(reason) => Truth::Unknown(reason),
        },
        ConditionOp::Country => {
            if !is_known_country(value) {
                return Truth::Unknown(format!("'{value}' is not a known country code"));
            }
            Truth::from_bool(
                facts
                    .country
                    .is_some_and(|c| c.trim().eq_ignore_ascii_case(value)),
            )
        }
        ConditionOp::IsPrivate => Truth::from_bool(
            ctx.source_ip
                .and_then(as_ipv4)
                .is_some_and(|ip| ip.is_private()),
        ),
        ConditionOp::Os => match value.parse::<Os>() {
            Ok(os) => Truth::from_bool(
                ctx.device
                    .as_ref()
                    .is_some_and(|d| d.os == Some(os)),
            ),
            Err(reason) => Truth::Unknown(reason),
        },
        ConditionOp::Managed => {
            Truth::from_bool(ctx.device.as_ref().is_some_and(|d| d.managed))
        }
    }
}

/// `suffix` matches the email's domain exactly or as a parent domain, so
/// `example.com` matches `a@example.com` and `a@eu.example.com` but not
/// `a@badexample.com`.
fn email_in_domain(email: &str, suffix: &str) -> bool {
    let email = email.trim().to_ascii_lowercase();
    let Some((_, domain)) = email.rsplit_once('@') else {
        return false;
    };
    domain == suffix
        || domain
            .strip_suffix(suffix)
            .is_some_and(|rest| rest.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ztna_contracts::condition::ConditionType;

    fn ctx() -> RequestContext {
        RequestContext::default()
            .with_user("alice@eu.example.com", ["eng", "oncall"])
            .with_device(Some(Os::Linux), true)
            .with_source_ip("10.1.2.3".parse().unwrap())
    }

    fn eval(condition: Condition, ctx: &RequestContext, country: Option<&str>) -> Truth {
        evaluate_condition(&condition, &Facts::new(ctx, country, true))
    }

    fn leaf(op: ConditionOp, value: &str) -> PolicyNode {
        PolicyNode::leaf(Condition::new(op, value))
    }

    fn corrupt() -> PolicyNode {
        leaf(ConditionOp::Cidr, "10.0.0.300/8")
    }

    // ── user conditions ──────────────────────────────────────────────────────

    #[test]
    fn in_group_is_exact() {
        let ctx = ctx();
        assert_eq!(eval(Condition::new(ConditionOp::InGroup, "eng"), &ctx, None), Truth::True);
        assert_eq!(eval(Condition::new(ConditionOp::InGroup, "Eng"), &ctx, None), Truth::False);
    }

    #[test]
    fn is_compares_email_case_insensitively() {
        let ctx = ctx();
        let c = Condition::new(ConditionOp::Is, "Alice@EU.example.com");
        assert_eq!(eval(c, &ctx, None), Truth::True);
    }

    #[test]
    fn email_suffix_respects_domain_boundary() {
        let ctx = ctx();
        for value in ["example.com", "@example.com", "eu.example.com", "@eu.example.com"] {
            assert_eq!(
                eval(Condition::new(ConditionOp::EmailSuffix, value), &ctx, None),
                Truth::True,
                "value {value}"
            );
        }
        let other = RequestContext::default().with_user("mallory@badexample.com", ["eng"]);
        assert_eq!(
            eval(Condition::new(ConditionOp::EmailSuffix, "example.com"), &other, None),
            Truth::False
        );
    }

    #[test]
    fn missing_user_is_false_not_unknown() {
        let anonymous = RequestContext::default();
        assert_eq!(
            eval(Condition::new(ConditionOp::InGroup, "eng"), &anonymous, None),
            Truth::False
        );
    }

    // ── network conditions ───────────────────────────────────────────────────

    #[test]
    fn cidr_contains_source_ip() {
        let ctx = ctx();
        assert_eq!(eval(Condition::new(ConditionOp::Cidr, "10.0.0.0/8"), &ctx, None), Truth::True);
        assert_eq!(
            eval(Condition::new(ConditionOp::Cidr, "192.168.0.0/16"), &ctx, None),
            Truth::False
        );
    }

    #[test]
    fn cidr_matches_ipv4_mapped_source() {
        let ctx = RequestContext::default().with_source_ip("::ffff:10.1.2.3".parse().unwrap());
        assert_eq!(eval(Condition::new(ConditionOp::Cidr, "10.0.0.0/8"), &ctx, None), Truth::True);
    }

    #[test]
    fn corrupt_cidr_is_unknown() {
        let ctx = ctx();
        assert!(matches!(
            eval(Condition::new(ConditionOp::Cidr, "not-a-cidr"), &ctx, None),
            Truth::Unknown(_)
        ));
    }

    #[test]
    fn country_uses_resolved_fact() {
        let ctx = ctx();
        let c = Condition::new(ConditionOp::Country, "DE");
        assert_eq!(eval(c.clone(), &ctx, Some("de")), Truth::True);
        assert_eq!(eval(c.clone(), &ctx, Some("FR")), Truth::False);
        assert_eq!(eval(c, &ctx, None), Truth::False);
        assert!(matches!(
            eval(Condition::new(ConditionOp::Country, "ZZ"), &ctx, Some("ZZ")),
            Truth::Unknown(_)
        ));
    }

    #[test]
    fn is_private_checks_rfc1918() {
        let public = RequestContext::default().with_source_ip("8.8.8.8".parse().unwrap());
        assert_eq!(eval(Condition::new(ConditionOp::IsPrivate, ""), &ctx(), None), Truth::True);
        assert_eq!(eval(Condition::new(ConditionOp::IsPrivate, ""), &public, None), Truth::False);
    }

    // ── device conditions ────────────────────────────────────────────────────

    #[test]
    fn os_and_managed() {
        let ctx = ctx();
        assert_eq!(eval(Condition::new(ConditionOp::Os, "linux"), &ctx, None), Truth::True);
        assert_eq!(eval(Condition::new(ConditionOp::Os, "darwin"), &ctx, None), Truth::False);
        assert!(matches!(
            eval(Condition::new(ConditionOp::Os, "beos"), &ctx, None),
            Truth::Unknown(_)
        ));
        assert_eq!(eval(Condition::new(ConditionOp::Managed, ""), &ctx, None), Truth::True);
    }

    #[test]
    fn foreign_operator_is_unknown() {
        let mut c = Condition::new(ConditionOp::Os, "linux");
        c.kind = ConditionType::User;
        assert!(matches!(eval(c, &ctx(), None), Truth::Unknown(_)));
    }

    // ── branches ─────────────────────────────────────────────────────────────

    #[test]
    fn vacuous_and_is_true_for_any_context() {
        for ctx in [RequestContext::default(), ctx()] {
            let facts = Facts::new(&ctx, None, false);
            assert_eq!(evaluate_tree(&PolicyNode::empty(), &facts), Truth::True);
        }
    }

    #[test]
    fn vacuous_or_follows_config() {
        let ctx = ctx();
        let empty_or = PolicyNode::branch(Operator::Or, vec![]);
        assert_eq!(evaluate_tree(&empty_or, &Facts::new(&ctx, None, true)), Truth::True);
        assert_eq!(evaluate_tree(&empty_or, &Facts::new(&ctx, None, false)), Truth::False);
    }

    #[test]
    fn kleene_and() {
        let ctx = ctx();
        let facts = Facts::new(&ctx, None, true);
        let false_and_unknown =
            PolicyNode::branch(Operator::And, vec![corrupt(), leaf(ConditionOp::Os, "darwin")]);
        assert_eq!(evaluate_tree(&false_and_unknown, &facts), Truth::False);

        let true_and_unknown =
            PolicyNode::branch(Operator::And, vec![leaf(ConditionOp::Managed, ""), corrupt()]);
        assert!(matches!(evaluate_tree(&true_and_unknown, &facts), Truth::Unknown(_)));
    }

    #[test]
    fn kleene_or() {
        let ctx = ctx();
        let facts = Facts::new(&ctx, None, true);
        let true_or_unknown =
            PolicyNode::branch(Operator::Or, vec![corrupt(), leaf(ConditionOp::Managed, "")]);
        assert_eq!(evaluate_tree(&true_or_unknown, &facts), Truth::True);

        let false_or_unknown =
            PolicyNode::branch(Operator::Or, vec![leaf(ConditionOp::Os, "darwin"), corrupt()]);
        assert!(matches!(evaluate_tree(&false_or_unknown, &facts), Truth::Unknown(_)));
    }

    #[test]
    fn nested_groups() {
        // User in eng AND (os darwin OR managed)
        let ctx = ctx();
        let tree = PolicyNode::branch(
            Operator::And,
            vec![
                leaf(ConditionOp::InGroup, "eng"),
                PolicyNode::branch(
                    Operator::Or,
                    vec![leaf(ConditionOp::Os, "darwin"), leaf(ConditionOp::Managed, "")],
                ),
            ],
        );
        assert!(evaluate_tree(&tree, &Facts::new(&ctx, None, true)).is_true());
    }
}
