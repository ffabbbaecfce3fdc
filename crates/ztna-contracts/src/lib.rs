//! # ztna-contracts
//!
//! Shared types for the ZTNA policy condition tree.
//!
//! Every crate in the workspace imports from here. This crate holds data
//! definitions, the wire format, the closed condition vocabulary and error
//! types. Editing, validation and evaluation live elsewhere.

pub mod condition;
pub mod context;
pub mod error;
pub mod node;
pub mod policy;
pub mod validation;

pub use condition::{Condition, ConditionField, ConditionOp, ConditionType, Os};
pub use context::{Decision, PolicyOutcome, PolicyTrace, RequestContext, Verdict};
pub use error::{ZtnaError, ZtnaResult};
pub use node::{Operator, PolicyNode};
pub use policy::{
    AccessPolicy, Application, DestinationRef, DestinationType, Effect, PolicyBundle, PolicyId,
    SignInPolicy, Stage,
};
pub use validation::{FailureKind, ValidationReport};
