//! Pre-submission validation for conditions, trees and envelopes.
//!
//! Validation never stops at the first problem: each function returns a
//! `ValidationReport` with every failure and the JSON path it applies to.
//! Stores turn a failed report into `ZtnaError::ValidationFailed` so nothing
//! invalid is ever persisted.

use ipnet::Ipv4Net;

use ztna_contracts::{
    condition::{is_known_country, Condition, ConditionOp, Os},
    node::PolicyNode,
    policy::{AccessPolicy, Application, DestinationRef, DestinationType, SignInPolicy, Stage},
    validation::{FailureKind, ValidationReport},
};

/// Parse an IPv4 CIDR literal such as `10.0.0.0/24`. A bare address without
/// a prefix length is rejected.
pub fn parse_ipv4_cidr(value: &str) -> Result<Ipv4Net, String> {
    value
        .parse::<Ipv4Net>()
        .map_err(|_| format!("'{value}' is not an IPv4 CIDR literal (expected e.g. 10.0.0.0/24)"))
}

/// Check `value` against the grammar of `op`. Returns a human-readable
/// message on failure.
pub fn check_value(op: ConditionOp, value: &str) -> Result<(), String> {
    match op {
        ConditionOp::Cidr => parse_ipv4_cidr(value).map(|_| ()),
        ConditionOp::Country => {
            if is_known_country(value) {
                Ok(())
            } else {
                Err(format!("'{value}' is not a known ISO 3166-1 alpha-2 country code"))
            }
        }
        ConditionOp::Os => value.parse::<Os>().map(|_| ()),
        ConditionOp::InGroup | ConditionOp::Is | ConditionOp::EmailSuffix => {
            if value.trim().is_empty() {
                Err(format!("operator '{op}' requires a non-empty value"))
            } else {
                Ok(())
            }
        }
        // Value-less operators ignore whatever is stored.
        ConditionOp::IsPrivate | ConditionOp::Managed => Ok(()),
    }
}

/// Validate one condition. `path` is the JSON path of the condition object.
pub fn validate_condition(condition: &Condition, path: &str) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !condition.kind.allows(condition.op) {
        report.push(
            FailureKind::Structural,
            format!("{path}.op"),
            format!(
                "operator '{}' is not allowed for condition type '{}'",
                condition.op, condition.kind
            ),
        );
        // The value grammar depends on a valid (type, op) pair.
        return report;
    }

    if condition.field != condition.op.field() {
        report.push(
            FailureKind::Structural,
            format!("{path}.field"),
            format!(
                "field '{}' does not match operator '{}' (expected '{}')",
                condition.field,
                condition.op,
                condition.op.field()
            ),
        );
    }

    if let Err(message) = check_value(condition.op, &condition.value) {
        report.push(FailureKind::ValueGrammar, format!("{path}.value"), message);
    }

    report
}

/// Validate every condition in a tree. When `stage` is set, conditions whose
/// type is outside the stage's vocabulary are targeting failures.
pub fn validate_tree(node: &PolicyNode, path: &str, stage: Option<Stage>) -> ValidationReport {
    let mut report = ValidationReport::default();
    walk_tree(node, path, stage, &mut report);
    report
}

fn walk_tree(node: &PolicyNode, path: &str, stage: Option<Stage>, report: &mut ValidationReport) {
    match node {
        PolicyNode::Leaf(condition) => {
            let condition_path = format!("{path}.condition");
            if let Some(stage) = stage {
                if !stage.allows(condition.kind) {
                    report.push(
                        FailureKind::Targeting,
                        format!("{condition_path}.type"),
                        format!("{} conditions are not available in {stage} policies", condition.kind),
                    );
                }
            }
            report.merge(validate_condition(condition, &condition_path));
        }
        PolicyNode::Branch { children, .. } => {
            for (idx, child) in children.iter().enumerate() {
                walk_tree(child, &format!("{path}.children[{idx}]"), stage, report);
            }
        }
    }
}

fn check_name(name: &str, report: &mut ValidationReport) {
    if name.trim().is_empty() {
        report.push(FailureKind::Structural, "name", "policy name must not be empty");
    }
}

/// Accepts host names and a single leading `*.` wildcard label.
fn check_sni(sni: &str) -> Result<(), String> {
    let host = sni.strip_prefix("*.").unwrap_or(sni);
    let valid = !host.is_empty()
        && host.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
    if valid {
        Ok(())
    } else {
        Err(format!("'{sni}' is not a valid server name"))
    }
}

/// Validate an access policy: name, tree, destination targeting and
/// gateway ids.
pub fn validate_access_policy(policy: &AccessPolicy) -> ValidationReport {
    let mut report = ValidationReport::default();
    check_name(&policy.name, &mut report);

    match policy.destination() {
        DestinationRef::Any | DestinationRef::App(_) => {}
        DestinationRef::Cidr(cidr) => {
            if let Err(message) = parse_ipv4_cidr(cidr) {
                report.push(FailureKind::ValueGrammar, "destination_cidr", message);
            }
        }
        DestinationRef::Sni(sni) => {
            if let Err(message) = check_sni(sni) {
                report.push(FailureKind::ValueGrammar, "destination_sni", message);
            }
        }
        DestinationRef::Missing(kind) => {
            let field = format!("destination_{}", destination_field_suffix(kind));
            report.push(
                FailureKind::Targeting,
                field.clone(),
                format!("destination_type '{kind}' requires '{field}' to be set"),
            );
        }
    }

    if policy.node_ids.iter().any(|id| id.trim().is_empty()) {
        report.push(FailureKind::Structural, "node_ids", "gateway ids must not be empty");
    }

    report.merge(validate_tree(&policy.root_node, "root_node", None));
    report
}

fn destination_field_suffix(kind: DestinationType) -> &'static str {
    match kind {
        DestinationType::Cidr => "cidr",
        DestinationType::App => "app_id",
        DestinationType::Sni => "sni",
        DestinationType::None => "type",
    }
}

/// Validate a sign-in policy: name and a tree restricted to its stage.
pub fn validate_sign_in_policy(policy: &SignInPolicy) -> ValidationReport {
    let mut report = ValidationReport::default();
    check_name(&policy.name, &mut report);
    report.merge(validate_tree(&policy.root_node, "root_node", Some(policy.stage)));
    report
}

/// Validate an application definition: name and CIDR list.
pub fn validate_application(app: &Application) -> ValidationReport {
    let mut report = ValidationReport::default();
    if app.id.trim().is_empty() {
        report.push(FailureKind::Structural, "id", "application id must not be empty");
    }
    if app.name.trim().is_empty() {
        report.push(FailureKind::Structural, "name", "application name must not be empty");
    }
    for (idx, cidr) in app.cidrs.iter().enumerate() {
        if let Err(message) = parse_ipv4_cidr(cidr) {
            report.push(FailureKind::ValueGrammar, format!("cidrs[{idx}]"), message);
        }
    }
    report
}
