//! # ztna-policy
//!
//! The reference evaluator for ZTNA access and sign-in policy trees.
//!
//! ## Overview
//!
//! This crate provides [`TreeEvaluator`], which implements the
//! [`PolicyEvaluator`](ztna_core::traits::PolicyEvaluator) trait over an
//! immutable [`PolicySnapshot`]. Policies are visited in ascending priority
//! and, by default, the first matching policy decides. If none matches, the
//! family default applies: deny for access, allow for sign-in.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::{path::Path, sync::Arc};
//! use ztna_policy::{EngineConfig, PolicySnapshot, SnapshotHandle, TreeEvaluator};
//!
//! let config = EngineConfig::from_file(Path::new("engine.toml"))?;
//! let snapshots = Arc::new(SnapshotHandle::new(PolicySnapshot::from_bundle(&bundle)));
//! let evaluator = TreeEvaluator::new(config, snapshots, Arc::new(directory));
//! ```
//!
//! ## Fail-closed evaluation
//!
//! A condition that cannot be interpreted makes its policy indeterminate.
//! An indeterminate deny or block policy applies; an indeterminate allow
//! policy does not.

pub mod config;
pub mod engine;
pub mod snapshot;
pub mod tree;

pub use config::{EngineConfig, Resolution};
pub use engine::TreeEvaluator;
pub use snapshot::{PolicySnapshot, SnapshotHandle};
pub use tree::{evaluate_tree, Facts, Truth};

// ── Tests ─────────────────────────────────────────────────────────────────────
