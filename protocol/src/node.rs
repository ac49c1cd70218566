//! Point-in-time status tree handed to mobile clients.

use serde::{Deserialize, Serialize};

use crate::alert::AlertLevel;

/// One node of an immutable status snapshot.
///
/// A snapshot is built once per login and never mutated afterwards; sessions
/// only ever read it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub label: String,
    #[serde(default)]
    pub alert_level: AlertLevel,
    #[serde(default)]
    pub alert_message: Option<String>,
    /// Whether the node is a container, independent of its current children.
    #[serde(default)]
    pub allows_children: bool,
    #[serde(default)]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// Creates a childless leaf.
    #[must_use]
    pub fn leaf(label: impl Into<String>, alert_level: AlertLevel) -> Self {
        Self {
            label: label.into(),
            alert_level,
            alert_message: None,
            allows_children: false,
            children: Vec::new(),
        }
    }

    /// Creates a container node holding `children` in the given order.
    #[must_use]
    pub fn branch(
        label: impl Into<String>,
        alert_level: AlertLevel,
        children: Vec<NodeSnapshot>,
    ) -> Self {
        Self {
            label: label.into(),
            alert_level,
            alert_message: None,
            allows_children: true,
            children,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.alert_message = Some(message.into());
        self
    }

    /// Alert message as transmitted: empty messages count as absent.
    #[must_use]
    pub fn effective_message(&self) -> Option<&str> {
        self.alert_message.as_deref().filter(|message| !message.is_empty())
    }

    /// Total number of nodes in this subtree, including `self`.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(NodeSnapshot::node_count)
            .sum::<usize>()
    }
}
