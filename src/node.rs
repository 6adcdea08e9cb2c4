//! Typed view of the node fields the inventory is built from.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{self as corev1, Node};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Condition type marking a node as healthy.
pub const READY_CONDITION: &str = "Ready";

/// A cluster node reduced to what the inventory needs.
///
/// `addresses` may be empty here; the mapper decides what to do with such a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub addresses: Vec<NodeAddress>,
    /// `status.nodeInfo` as-is; `None` when the node does not report it.
    #[serde(default)]
    pub node_info: Option<serde_json::Value>,
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    #[serde(rename = "type")]
    pub type_: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub type_: String,
    /// One of `"True"`, `"False"` or `"Unknown"`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ClusterNode {
    /// The address Ansible connects to: the first reported address.
    pub fn primary_address(&self) -> Option<&str> {
        self.addresses.first().map(|address| address.address.as_str())
    }

    /// Status of the first `Ready` condition, `false` when there is none.
    pub fn is_ready(&self) -> bool {
        self.conditions
            .iter()
            .find(|condition| condition.type_ == READY_CONDITION)
            .map(|condition| condition.status == "True")
            .unwrap_or(false)
    }
}

impl From<corev1::NodeAddress> for NodeAddress {
    fn from(address: corev1::NodeAddress) -> Self {
        Self {
            type_: address.type_,
            address: address.address,
        }
    }
}

impl From<corev1::NodeCondition> for NodeCondition {
    fn from(condition: corev1::NodeCondition) -> Self {
        Self {
            type_: condition.type_,
            status: condition.status,
            reason: condition.reason,
            message: condition.message,
        }
    }
}

impl TryFrom<Node> for ClusterNode {
    type Error = Error;

    fn try_from(node: Node) -> Result<Self, Self::Error> {
        let name = node.metadata.name.ok_or(Error::MissingNodeName)?;
        let status = node.status.unwrap_or_default();

        let node_info = status
            .node_info
            .map(serde_json::to_value)
            .transpose()?;

        Ok(Self {
            name,
            labels: node.metadata.labels.unwrap_or_default(),
            annotations: node.metadata.annotations.unwrap_or_default(),
            addresses: status
                .addresses
                .unwrap_or_default()
                .into_iter()
                .map(NodeAddress::from)
                .collect(),
            node_info,
            conditions: status
                .conditions
                .unwrap_or_default()
                .into_iter()
                .map(NodeCondition::from)
                .collect(),
        })
    }
}
