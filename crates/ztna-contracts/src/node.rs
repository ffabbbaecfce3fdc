//! The recursive policy condition tree.
//!
//! On the wire a node is `{ operator, children?, condition? }`. In memory it
//! is a tagged enum, so a node is a leaf or a branch and never both. Decoding
//! rejects a node that carries both a `condition` and `children`; a node with
//! neither decodes as an empty branch, because the backend drops empty
//! `children` arrays when it serializes.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::condition::Condition;

/// How a branch combines its children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    #[default]
    And,
    Or,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => f.write_str("AND"),
            Self::Or => f.write_str("OR"),
        }
    }
}

/// A node of the condition tree.
///
/// Children are owned by their parent. Editing never mutates a tree in
/// place; the mutation engine returns a new value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PolicyNode {
    /// A single predicate.
    Leaf(Condition),
    /// An AND/OR combination of child nodes. An empty branch places no
    /// constraint on the request.
    Branch {
        operator: Operator,
        children: Vec<PolicyNode>,
    },
}

impl PolicyNode {
    /// `{AND, []}`: the root every new policy starts with.
    pub fn empty() -> Self {
        Self::Branch {
            operator: Operator::And,
            children: Vec::new(),
        }
    }

    pub fn leaf(condition: Condition) -> Self {
        Self::Leaf(condition)
    }

    pub fn branch(operator: Operator, children: Vec<PolicyNode>) -> Self {
        Self::Branch { operator, children }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// The leaf's condition, or `None` for a branch.
    pub fn condition(&self) -> Option<&Condition> {
        match self {
            Self::Leaf(condition) => Some(condition),
            Self::Branch { .. } => None,
        }
    }

    /// The branch's children, or `None` for a leaf.
    pub fn children(&self) -> Option<&[PolicyNode]> {
        match self {
            Self::Leaf(_) => None,
            Self::Branch { children, .. } => Some(children),
        }
    }

    /// The branch's operator, or `None` for a leaf.
    pub fn operator(&self) -> Option<Operator> {
        match self {
            Self::Leaf(_) => None,
            Self::Branch { operator, .. } => Some(*operator),
        }
    }

    /// Every condition in the tree, depth-first, left to right.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        match self {
            Self::Leaf(condition) => out.push(condition),
            Self::Branch { children, .. } => {
                for child in children {
                    child.collect_conditions(out);
                }
            }
        }
    }

    /// Total number of nodes, this one included.
    pub fn node_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Branch { children, .. } => 1 + children.iter().map(Self::node_count).sum::<usize>(),
        }
    }
}

impl Default for PolicyNode {
    fn default() -> Self {
        Self::empty()
    }
}

// ── Wire format ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct WireNodeRef<'a> {
    operator: Operator,
    #[serde(skip_serializing_if = "Option::is_none")]
    children: Option<&'a [PolicyNode]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    condition: Option<&'a Condition>,
}

#[derive(Deserialize)]
struct WireNode {
    #[serde(default)]
    operator: Operator,
    #[serde(default)]
    children: Option<Vec<PolicyNode>>,
    #[serde(default)]
    condition: Option<Condition>,
}

impl Serialize for PolicyNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            // Leaves carry a placeholder operator; readers ignore it.
            Self::Leaf(condition) => WireNodeRef {
                operator: Operator::And,
                children: None,
                condition: Some(condition),
            },
            Self::Branch { operator, children } => WireNodeRef {
                operator: *operator,
                children: Some(children),
                condition: None,
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PolicyNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireNode::deserialize(deserializer)?;
        match (wire.condition, wire.children) {
            (Some(_), Some(_)) => Err(de::Error::custom(
                "policy node has both `condition` and `children`; a node must be a leaf or a branch",
            )),
            (Some(condition), None) => Ok(Self::Leaf(condition)),
            (None, children) => Ok(Self::Branch {
                operator: wire.operator,
                children: children.unwrap_or_default(),
            }),
        }
    }
}

// ── Summary rendering ───────────────────────────────────────────────────────

impl fmt::Display for PolicyNode {
    /// One-line summary, e.g. `User: in_group eng AND (Device: os linux OR Device: managed)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(condition) => write!(f, "{condition}"),
            // An empty OR depends on the engine's vacuous-or setting.
            Self::Branch { operator: Operator::Or, children } if children.is_empty() => {
                f.write_str("OR()")
            }
            Self::Branch { children, .. } if children.is_empty() => f.write_str("any request"),
            Self::Branch { operator, children } => {
                for (idx, child) in children.iter().enumerate() {
                    if idx > 0 {
                        write!(f, " {operator} ")?;
                    }
                    let nested = matches!(child, Self::Branch { children, .. } if children.len() > 1);
                    if nested {
                        write!(f, "({child})")?;
                    } else {
                        write!(f, "{child}")?;
                    }
                }
                Ok(())
            }
        }
    }
}
