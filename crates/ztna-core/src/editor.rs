//! The tree mutation engine.
//!
//! Every operation takes a tree by reference and returns a new tree; the
//! input is never modified. Operations are total: an edit aimed at the
//! wrong kind of node, an out-of-range index or an invalid path leaves the
//! tree unchanged. Value grammar is not checked here; run
//! [`crate::validate`] before submitting.
//!
//! Adding a condition or sub-group to a *leaf* turns the leaf into a branch.
//! [`LeafConversion::Wrap`] (the default) keeps the leaf as the branch's
//! first child; [`LeafConversion::Replace`] discards it, matching older
//! editors that treated the action as "replace this leaf".

use tracing::debug;

use ztna_contracts::{
    condition::{Condition, ConditionOp, ConditionType},
    node::{Operator, PolicyNode},
    policy::Stage,
};

/// What happens to a leaf's own condition when a child is added to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LeafConversion {
    /// `leaf` becomes `{AND, [leaf, new]}`.
    #[default]
    Wrap,
    /// `leaf` becomes `{AND, [new]}`; the original condition is dropped.
    Replace,
}

/// A partial update to a leaf condition.
///
/// Changing `kind` resets the operator to the type's default and clears the
/// value. Changing `op` resets the field and clears the value. `value` is
/// only applied when neither `kind` nor `op` changed the condition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionPatch {
    pub kind: Option<ConditionType>,
    pub op: Option<ConditionOp>,
    pub value: Option<String>,
}

impl ConditionPatch {
    pub fn kind(kind: ConditionType) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn op(op: ConditionOp) -> Self {
        Self {
            op: Some(op),
            ..Self::default()
        }
    }

    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }
}

/// Apply `patch` to `condition` with cascading reset.
pub fn apply_patch(condition: &Condition, patch: &ConditionPatch) -> Condition {
    if let Some(kind) = patch.kind.filter(|k| *k != condition.kind) {
        return Condition::default_for(kind);
    }

    if let Some(op) = patch.op.filter(|o| *o != condition.op) {
        if condition.kind.allows(op) {
            return Condition::new(op, String::new());
        }
        debug!(
            condition_type = %condition.kind,
            op = %op,
            "ignoring operator outside the condition type's vocabulary"
        );
        return condition.clone();
    }

    match &patch.value {
        Some(value) => Condition {
            value: value.clone(),
            ..condition.clone()
        },
        None => condition.clone(),
    }
}

/// One editing action, addressed to a node by [`TreeEditor::apply_at`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    AddCondition,
    AddSubGroup,
    RemoveChild(usize),
    SetOperator(Operator),
    SetCondition(ConditionPatch),
}

/// Stateless editor configured for one policy family.
///
/// The editor's stage decides which condition a new leaf starts with, so
/// a pre-auth sign-in tree never gains a `User` leaf by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeEditor {
    stage: Option<Stage>,
    leaf_conversion: LeafConversion,
}

impl TreeEditor {
    /// Editor for access policies: new leaves are `User/in_group`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Editor for sign-in policies of `stage`.
    pub fn for_stage(stage: Stage) -> Self {
        Self {
            stage: Some(stage),
            ..Self::default()
        }
    }

    pub fn with_leaf_conversion(mut self, mode: LeafConversion) -> Self {
        self.leaf_conversion = mode;
        self
    }

    pub fn stage(&self) -> Option<Stage> {
        self.stage
    }

    /// The leaf inserted by [`TreeEditor::add_condition`].
    pub fn default_leaf(&self) -> PolicyNode {
        let kind = self.stage.map_or(ConditionType::User, Stage::default_type);
        PolicyNode::leaf(Condition::default_for(kind))
    }

    /// Append a default leaf to a branch, or convert a leaf into a branch.
    pub fn add_condition(&self, node: &PolicyNode) -> PolicyNode {
        self.append_child(node, self.default_leaf())
    }

    /// Append an empty `OR` group to a branch, or convert a leaf into a branch.
    pub fn add_sub_group(&self, node: &PolicyNode) -> PolicyNode {
        self.append_child(node, PolicyNode::branch(Operator::Or, Vec::new()))
    }

    fn append_child(&self, node: &PolicyNode, child: PolicyNode) -> PolicyNode {
        match node {
            PolicyNode::Branch { operator, children } => {
                let mut children = children.clone();
                children.push(child);
                PolicyNode::branch(*operator, children)
            }
            PolicyNode::Leaf(_) => {
                let children = match self.leaf_conversion {
                    LeafConversion::Wrap => vec![node.clone(), child],
                    LeafConversion::Replace => vec![child],
                };
                PolicyNode::branch(Operator::And, children)
            }
        }
    }

    /// Remove the child at `index`. An emptied branch stays in place.
    pub fn remove_child(&self, node: &PolicyNode, index: usize) -> PolicyNode {
        match node {
            PolicyNode::Branch { operator, children } if index < children.len() => {
                let mut children = children.clone();
                children.remove(index);
                PolicyNode::branch(*operator, children)
            }
            _ => {
                debug!(index, "remove_child has no child at index; tree unchanged");
                node.clone()
            }
        }
    }

    /// Replace a branch's operator. Leaves are returned unchanged.
    pub fn set_operator(&self, node: &PolicyNode, operator: Operator) -> PolicyNode {
        match node {
            PolicyNode::Branch { children, .. } => PolicyNode::branch(operator, children.clone()),
            PolicyNode::Leaf(_) => node.clone(),
        }
    }

    /// Patch a leaf's condition. Branches are returned unchanged.
    pub fn set_condition(&self, node: &PolicyNode, patch: &ConditionPatch) -> PolicyNode {
        match node {
            PolicyNode::Leaf(condition) => PolicyNode::leaf(apply_patch(condition, patch)),
            PolicyNode::Branch { .. } => node.clone(),
        }
    }

    /// Apply `edit` to `node` itself.
    pub fn apply(&self, node: &PolicyNode, edit: &Edit) -> PolicyNode {
        match edit {
            Edit::AddCondition => self.add_condition(node),
            Edit::AddSubGroup => self.add_sub_group(node),
            Edit::RemoveChild(index) => self.remove_child(node, *index),
            Edit::SetOperator(operator) => self.set_operator(node, *operator),
            Edit::SetCondition(patch) => self.set_condition(node, patch),
        }
    }

    /// Apply `edit` to the node reached by following child indices `path`
    /// from `root`. An empty path targets the root.
    pub fn apply_at(&self, root: &PolicyNode, path: &[usize], edit: &Edit) -> PolicyNode {
        let Some((&idx, rest)) = path.split_first() else {
            return self.apply(root, edit);
        };

        match root {
            PolicyNode::Branch { operator, children } if idx < children.len() => {
                let children = children
                    .iter()
                    .enumerate()
                    .map(|(i, child)| {
                        if i == idx {
                            self.apply_at(child, rest, edit)
                        } else {
                            child.clone()
                        }
                    })
                    .collect();
                PolicyNode::branch(*operator, children)
            }
            _ => {
                debug!(?path, "edit path does not address a node; tree unchanged");
                root.clone()
            }
        }
    }
}
