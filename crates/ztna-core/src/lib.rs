//! # ztna-core
//!
//! Editing and validation for ZTNA policy condition trees, plus the trait
//! seams to the collaborators the model depends on.
//!
//! This crate provides:
//! - [`editor::TreeEditor`], the pure tree mutation engine
//! - [`validate`], value-grammar, structural and targeting checks
//! - [`codec`], JSON decoding with structural error mapping
//! - [`traits`], `PolicyStore`, `ApplicationDirectory`, `GeoIpResolver`,
//!   `PolicyEvaluator` and the `Envelope` abstraction
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ztna_core::editor::{Edit, TreeEditor};
//!
//! let editor = TreeEditor::for_stage(Stage::PreAuth);
//! let tree = editor.apply_at(&policy.root_node, &[], &Edit::AddCondition);
//! ztna_core::validate::validate_tree(&tree, "root_node", Some(Stage::PreAuth)).into_result(&policy.name)?;
//! ```

pub mod codec;
pub mod editor;
pub mod traits;
pub mod validate;

pub use editor::{ConditionPatch, Edit, LeafConversion, TreeEditor};
pub use traits::{
    ApplicationDirectory, Envelope, GeoIpResolver, NoopGeoIpResolver, PolicyEvaluator, PolicyStore,
};
