//! Edges and branch handles

use serde::{Deserialize, Serialize};

/// Handle marking the failure route of a node
pub const FAIL_HANDLE: &str = "fail_one_of";

/// Prefix used by intent edges of decision nodes
pub const INTENT_PREFIX: &str = "intent_chain|";

/// Branch class taken when no other branch matches the selected handle
pub const DEFAULT_BRANCH: &str = "default";

/// Directed connection between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

/// Routing class of an edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind<'a> {
    /// Always taken when the source succeeds
    Normal,
    /// Taken only when the source fails under the fail-branch strategy
    Fail,
    /// Taken when the source selects this class at run time
    Branch(&'a str),
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_node_id: source.into(),
            target_node_id: target.into(),
            source_handle: None,
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    pub fn kind(&self) -> EdgeKind<'_> {
        match self.source_handle.as_deref() {
            None | Some("") => EdgeKind::Normal,
            Some(FAIL_HANDLE) => EdgeKind::Fail,
            Some(handle) => {
                EdgeKind::Branch(handle.strip_prefix(INTENT_PREFIX).unwrap_or(handle))
            }
        }
    }

    pub fn is_fail(&self) -> bool {
        self.kind() == EdgeKind::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_kinds() {
        assert_eq!(Edge::new("a", "b").kind(), EdgeKind::Normal);
        assert_eq!(Edge::new("a", "b").with_handle("").kind(), EdgeKind::Normal);
        assert_eq!(
            Edge::new("a", "b").with_handle(FAIL_HANDLE).kind(),
            EdgeKind::Fail
        );
        assert_eq!(
            Edge::new("a", "b").with_handle("branch_one_of::x1").kind(),
            EdgeKind::Branch("branch_one_of::x1")
        );
        assert_eq!(
            Edge::new("a", "b").with_handle("intent_chain|refund").kind(),
            EdgeKind::Branch("refund")
        );
    }
}
