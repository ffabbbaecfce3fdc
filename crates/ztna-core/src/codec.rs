//! JSON encoding and decoding of policy documents.
//!
//! Decoding is where structural errors surface first: unknown condition
//! types or operators and nodes carrying both `condition` and `children`
//! fail here with `ZtnaError::MalformedPolicy`. Decoding does not run value
//! or targeting validation.

use serde::{de::DeserializeOwned, Serialize};

use ztna_contracts::{
    error::{ZtnaError, ZtnaResult},
    node::PolicyNode,
    policy::{AccessPolicy, PolicyBundle, SignInPolicy},
};

fn decode<T: DeserializeOwned>(json: &str, what: &str) -> ZtnaResult<T> {
    serde_json::from_str(json).map_err(|e| ZtnaError::MalformedPolicy {
        reason: format!("failed to decode {what}: {e}"),
    })
}

pub fn decode_tree(json: &str) -> ZtnaResult<PolicyNode> {
    decode(json, "policy node")
}

pub fn decode_access_policy(json: &str) -> ZtnaResult<AccessPolicy> {
    decode(json, "access policy")
}

pub fn decode_sign_in_policy(json: &str) -> ZtnaResult<SignInPolicy> {
    decode(json, "sign-in policy")
}

pub fn decode_bundle(json: &str) -> ZtnaResult<PolicyBundle> {
    decode(json, "policy bundle")
}

/// Encode any policy document as compact JSON.
pub fn encode<T: Serialize>(value: &T) -> ZtnaResult<String> {
    serde_json::to_string(value).map_err(|e| ZtnaError::MalformedPolicy {
        reason: format!("failed to encode policy document: {e}"),
    })
}
