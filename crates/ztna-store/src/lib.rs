//! # ztna-store
//!
//! In-memory reference implementations of the persistence collaborators.
//!
//! ## Overview
//!
//! [`InMemoryPolicyStore`] implements
//! [`PolicyStore`](ztna_core::traits::PolicyStore) for access and sign-in
//! policies. Saves are validated first and written whole, ids and versions
//! are assigned by the store, and a save carrying a stale version is
//! rejected with `ZtnaError::VersionConflict`.
//!
//! [`InMemoryApplicationDirectory`] implements
//! [`ApplicationDirectory`](ztna_core::traits::ApplicationDirectory).
//!
//! [`RangeGeoIpResolver`] implements
//! [`GeoIpResolver`](ztna_core::traits::GeoIpResolver) over a file of
//! `start end country` IPv4 ranges.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ztna_core::traits::PolicyStore;
//! use ztna_store::InMemoryPolicyStore;
//!
//! let store = InMemoryPolicyStore::<SignInPolicy>::new();
//! let saved = store.create(policy)?;
//! store.set_enabled(&saved.id, false)?;
//! snapshots.refresh_from(&access_store, &store)?;
//! ```

pub mod directory;
pub mod geoip;
pub mod memory;

pub use directory::InMemoryApplicationDirectory;
pub use geoip::RangeGeoIpResolver;
pub use memory::InMemoryPolicyStore;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use ztna_contracts::{
        condition::{Condition, ConditionOp},
        error::ZtnaError,
        node::{Operator, PolicyNode},
        policy::{AccessPolicy, Application, DestinationType, Effect, PolicyId, SignInPolicy, Stage},
        validation::FailureKind,
    };
    use ztna_core::{
        codec,
        traits::{ApplicationDirectory, PolicyStore},
    };

    use super::{InMemoryApplicationDirectory, InMemoryPolicyStore};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn leaf(op: ConditionOp, value: &str) -> PolicyNode {
        PolicyNode::leaf(Condition::new(op, value))
    }

    /// The `eng-vpn` policy: engineers on managed Linux or macOS devices may
    /// reach 10.10.0.0/16.
    fn eng_vpn() -> AccessPolicy {
        let mut policy = AccessPolicy::new("eng-vpn", 100);
        policy.effect = Effect::Allow;
        policy.destination_type = DestinationType::Cidr;
        policy.destination_cidr = Some("10.10.0.0/16".to_string());
        policy.root_node = PolicyNode::branch(
            Operator::And,
            vec![
                leaf(ConditionOp::InGroup, "eng"),
                PolicyNode::branch(
                    Operator::Or,
                    vec![leaf(ConditionOp::Os, "linux"), leaf(ConditionOp::Os, "darwin")],
                ),
                leaf(ConditionOp::Managed, ""),
            ],
        );
        policy
    }

    // ── Policy store ──────────────────────────────────────────────────────────

    /// Scenario A: a created policy is fetched back with an identical
    /// structure.
    #[test]
    fn test_create_then_get_returns_identical_policy() {
        let store = InMemoryPolicyStore::<AccessPolicy>::new();
        let created = store.create(eng_vpn()).unwrap();

        assert!(!created.id.is_unassigned());
        assert_eq!(created.version, 1);
        assert!(created.updated_at.is_some());

        let fetched = store.get(&created.id).unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.root_node, eng_vpn().root_node);
    }

    /// Scenario A as written on the wire: leaves omit `field`. The stored
    /// and fetched copies match the decoded structure.
    #[test]
    fn test_scenario_a_document_round_trips_through_store() {
        let doc = r#"{
            "name": "eng-vpn",
            "priority": 100,
            "effect": "allow",
            "destination_type": "cidr",
            "destination_cidr": "10.0.0.0/24",
            "root_node": {
                "operator": "AND",
                "children": [
                    { "condition": { "type": "User", "op": "in_group", "value": "engineering" } }
                ]
            }
        }"#;
        let decoded = codec::decode_access_policy(doc).unwrap();

        let store = InMemoryPolicyStore::<AccessPolicy>::new();
        let created = store.create(decoded.clone()).unwrap();
        let fetched = store.get(&created.id).unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.name, decoded.name);
        assert_eq!(fetched.priority, 100);
        assert_eq!(fetched.destination_cidr.as_deref(), Some("10.0.0.0/24"));
        assert_eq!(fetched.root_node, decoded.root_node);
        assert_eq!(
            fetched.root_node,
            PolicyNode::branch(Operator::And, vec![leaf(ConditionOp::InGroup, "engineering")])
        );
    }

    /// Invalid policies are rejected and nothing is written.
    #[test]
    fn test_invalid_policy_is_not_saved() {
        let store = InMemoryPolicyStore::<AccessPolicy>::new();
        let mut policy = eng_vpn();
        policy.destination_cidr = None;
        policy.root_node = leaf(ConditionOp::Cidr, "10.0.0.0");

        match store.create(policy).unwrap_err() {
            ZtnaError::ValidationFailed { report, .. } => {
                assert!(report.has_kind(FailureKind::Targeting));
                assert!(report.has_kind(FailureKind::ValueGrammar));
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
        assert!(store.is_empty().unwrap());
    }

    /// A pre-auth policy carrying a `User` condition fails targeting checks.
    #[test]
    fn test_stage_violation_blocks_save() {
        let store = InMemoryPolicyStore::<SignInPolicy>::new();
        let mut policy = SignInPolicy::new("pre", 100, Stage::PreAuth);
        policy.root_node = PolicyNode::branch(Operator::And, vec![leaf(ConditionOp::InGroup, "eng")]);

        let err = store.create(policy).unwrap_err();
        assert!(matches!(err, ZtnaError::ValidationFailed { .. }));
        assert!(store.list().unwrap().is_empty());
    }

    /// Updates bump the version; a stale version is a conflict.
    #[test]
    fn test_stale_update_conflicts() {
        let store = InMemoryPolicyStore::<AccessPolicy>::new();
        let created = store.create(eng_vpn()).unwrap();

        let mut first = created.clone();
        first.name = "eng-vpn-v2".to_string();
        let updated = store.update(first).unwrap();
        assert_eq!(updated.version, 2);

        let mut stale = created;
        stale.name = "eng-vpn-stale".to_string();
        match store.update(stale).unwrap_err() {
            ZtnaError::VersionConflict { expected, actual, .. } => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected VersionConflict, got {other:?}"),
        }
        assert_eq!(store.get(&updated.id).unwrap().name, "eng-vpn-v2");
    }

    /// Failed validation on update leaves the stored policy untouched.
    #[test]
    fn test_invalid_update_keeps_previous_version() {
        let store = InMemoryPolicyStore::<AccessPolicy>::new();
        let created = store.create(eng_vpn()).unwrap();

        let mut broken = created.clone();
        broken.root_node = leaf(ConditionOp::Country, "ZZ");
        assert!(store.update(broken).is_err());
        assert_eq!(store.get(&created.id).unwrap(), created);
    }

    /// Toggling changes only `enabled`, `version` and `updated_at`, and
    /// toggling to the current value is a no-op.
    #[test]
    fn test_set_enabled_is_idempotent() {
        let store = InMemoryPolicyStore::<AccessPolicy>::new();
        let created = store.create(eng_vpn()).unwrap();

        let same = store.set_enabled(&created.id, true).unwrap();
        assert_eq!(same, created);

        let disabled = store.set_enabled(&created.id, false).unwrap();
        assert!(!disabled.enabled);
        assert_eq!(disabled.version, 2);
        assert_eq!(disabled.root_node, created.root_node);
        assert_eq!(disabled.name, created.name);
        assert_eq!(disabled.destination_cidr, created.destination_cidr);

        let again = store.set_enabled(&created.id, false).unwrap();
        assert_eq!(again, disabled);
    }

    #[test]
    fn test_list_sorted_by_priority() {
        let store = InMemoryPolicyStore::<AccessPolicy>::new();
        for priority in [300, 100, 200] {
            let mut p = eng_vpn();
            p.name = format!("p{priority}");
            p.priority = priority;
            store.create(p).unwrap();
        }
        let priorities: Vec<i32> = store.list().unwrap().iter().map(|p| p.priority).collect();
        assert_eq!(priorities, vec![100, 200, 300]);
    }

    #[test]
    fn test_missing_ids_are_not_found() {
        let store = InMemoryPolicyStore::<SignInPolicy>::new();
        let id = PolicyId::from("nope");
        assert!(matches!(store.get(&id), Err(ZtnaError::PolicyNotFound { .. })));
        assert!(matches!(store.delete(&id), Err(ZtnaError::PolicyNotFound { .. })));
        assert!(matches!(
            store.set_enabled(&id, false),
            Err(ZtnaError::PolicyNotFound { .. })
        ));

        let mut ghost = SignInPolicy::new("ghost", 100, Stage::PostAuth);
        ghost.id = id;
        assert!(matches!(store.update(ghost), Err(ZtnaError::PolicyNotFound { .. })));
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let store = InMemoryPolicyStore::<AccessPolicy>::new();
        let mut p = eng_vpn();
        p.id = PolicyId::from("fixed");
        store.create(p.clone()).unwrap();
        assert!(matches!(store.create(p), Err(ZtnaError::StoreError { .. })));
    }

    #[test]
    fn test_delete_then_get() {
        let store = InMemoryPolicyStore::<AccessPolicy>::new();
        let created = store.create(eng_vpn()).unwrap();
        store.delete(&created.id).unwrap();
        assert!(store.get(&created.id).is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let store = InMemoryPolicyStore::<AccessPolicy>::new();
        let other = store.clone();
        store.create(eng_vpn()).unwrap();
        assert_eq!(other.len().unwrap(), 1);
    }

    // ── Application directory ─────────────────────────────────────────────────

    #[test]
    fn test_directory_dedups_cidrs() {
        let directory = InMemoryApplicationDirectory::from_applications([Application {
            id: "gitlab".to_string(),
            name: "GitLab".to_string(),
            description: String::new(),
            cidrs: vec![
                "10.10.0.0/24".to_string(),
                " 10.20.0.0/24".to_string(),
                "10.10.0.0/24".to_string(),
            ],
        }])
        .unwrap();

        let app = directory.resolve("gitlab").unwrap();
        assert_eq!(app.cidrs, vec!["10.10.0.0/24", "10.20.0.0/24"]);
        assert!(directory.resolve("jira").is_none());
    }

    #[test]
    fn test_directory_rejects_bad_cidr() {
        let result = InMemoryApplicationDirectory::from_applications([Application {
            id: "bad".to_string(),
            name: "Bad".to_string(),
            description: String::new(),
            cidrs: vec!["10.10.0.0/40".to_string()],
        }]);
        assert!(matches!(result, Err(ZtnaError::ValidationFailed { .. })));
    }

    #[test]
    fn test_directory_remove() {
        let directory = InMemoryApplicationDirectory::new();
        directory
            .upsert(Application {
                id: "wiki".to_string(),
                name: "Wiki".to_string(),
                description: String::new(),
                cidrs: vec!["10.30.0.0/24".to_string()],
            })
            .unwrap();
        assert_eq!(directory.remove("wiki").unwrap().name, "Wiki");
        assert!(matches!(
            directory.remove("wiki"),
            Err(ZtnaError::ApplicationNotFound { .. })
        ));
    }
}
