//! # ztna-gateway
//!
//! Compiles access policy trees into the flat rule lists gateways enforce.
//!
//! Gateways match a connection against a conjunction of source tags and a
//! single destination; they do not interpret trees. [`compile`] expands each
//! enabled policy's tree into disjunctive normal form and emits one
//! [`GatewayRule`] per alternative. The resulting [`GatewayConfig`] carries a
//! [`config_hash`] so gateways can skip reloading an unchanged rule set.
//!
//! ```rust,ignore
//! let options = CompileOptions { node_id: Some("gw-eu-1".into()), ..Default::default() };
//! let config = ztna_gateway::compile(&policies, &directory, &options)?;
//! if config.config_hash != gateway.current_hash { push(config) }
//! ```

pub mod compile;
pub mod hash;
pub mod rule;

pub use compile::{compile, CompileOptions, ANY_DESTINATION, DEFAULT_MAX_TERMS};
pub use hash::{config_hash, EMPTY_CONFIG_HASH};
pub use rule::{
    DestinationTagType, GatewayConfig, GatewayRule, RuleAction, SourceTag, SourceTagType,
};
