//! Validation report types.
//!
//! Validators collect every failure in one pass so an editor can show all
//! problems at once. Each failure names the JSON path of the offending
//! field, e.g. `root_node.children[1].condition.value`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ZtnaError, ZtnaResult};

/// Which class of rule a failure breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The tree or envelope shape is wrong: operator outside its type's
    /// vocabulary, field out of sync with the operator, blank name.
    Structural,
    /// A condition value does not follow its operator's grammar.
    ValueGrammar,
    /// Destination or stage targeting is inconsistent.
    Targeting,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structural => f.write_str("structural"),
            Self::ValueGrammar => f.write_str("value"),
            Self::Targeting => f.write_str("targeting"),
        }
    }
}

/// A single failed rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub kind: FailureKind,
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.path, self.message)
    }
}

/// All failures found while validating one subject. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn push(&mut self, kind: FailureKind, path: impl Into<String>, message: impl Into<String>) {
        self.failures.push(ValidationFailure {
            kind,
            path: path.into(),
            message: message.into(),
        });
    }

    /// Append every failure of `other`.
    pub fn merge(&mut self, other: ValidationReport) {
        self.failures.extend(other.failures);
    }

    pub fn has_kind(&self, kind: FailureKind) -> bool {
        self.failures.iter().any(|f| f.kind == kind)
    }

    /// Semicolon-separated list of every failure.
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// `Ok(())` when the report passed, otherwise `ZtnaError::ValidationFailed`
    /// naming `subject`.
    pub fn into_result(self, subject: impl Into<String>) -> ZtnaResult<()> {
        if self.passed() {
            Ok(())
        } else {
            Err(ZtnaError::ValidationFailed {
                subject: subject.into(),
                report: self,
            })
        }
    }
}
