//! Operation vocabulary shared by clients and the tree.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::RequestId;

/// Child slot of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Left,
    Right,
}

impl Position {
    /// Where `target` goes relative to a node holding `pivot`.
    ///
    /// `None` means the node itself is the destination.
    #[must_use]
    pub fn route(target: i64, pivot: i64) -> Option<Self> {
        match target.cmp(&pivot) {
            Ordering::Equal => None,
            Ordering::Less => Some(Self::Left),
            Ordering::Greater => Some(Self::Right),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Insert,
    Contains,
    Remove,
}

impl OperationKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Contains => "contains",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Answer to exactly one operation, delivered straight to its requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationReply {
    /// Insert or remove completed.
    OperationFinished { id: RequestId },
    /// Outcome of a membership check.
    ContainsResult { id: RequestId, result: bool },
}

impl OperationReply {
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            Self::OperationFinished { id } | Self::ContainsResult { id, .. } => *id,
        }
    }

    /// Whether this reply has the shape `kind` expects.
    #[must_use]
    pub fn answers(&self, kind: OperationKind) -> bool {
        matches!(
            (self, kind),
            (
                Self::OperationFinished { .. },
                OperationKind::Insert | OperationKind::Remove
            ) | (Self::ContainsResult { .. }, OperationKind::Contains)
        )
    }
}
