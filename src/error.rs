use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while building the node inventory.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration file could not be read.
    #[error("failed to read inventory configuration {path:?}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for this plugin.
    #[error("failed to parse inventory configuration {path:?}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The `plugin` option names another plugin.
    #[error("invalid plugin configuration: expected plugin `{expected}`, found `{found}`")]
    InvalidPlugin {
        expected: &'static str,
        found: String,
    },

    /// The configured group name is empty.
    #[error("invalid plugin configuration: group name must not be empty")]
    EmptyGroup,

    /// The configured group name is a key Ansible reserves in inventory output.
    #[error("invalid plugin configuration: group name `{0}` is reserved by Ansible")]
    ReservedGroup(String),

    /// A node came back without `metadata.name`.
    #[error("cluster returned a node without metadata.name")]
    MissingNodeName,

    /// A named node lacks data required to build its host entry.
    #[error("node `{node}` cannot be added to the inventory: {defect}")]
    DataIntegrity { node: String, defect: NodeDefect },

    /// The node was not present in the static node source.
    #[error("node `{0}` not found")]
    NodeNotFound(String),

    /// The nodes document given to the static client could not be loaded.
    #[error("failed to load nodes from {path:?}")]
    NodesFile {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The cluster could not be queried.
    #[error("failed to query cluster nodes")]
    Transport(#[from] kube::Error),

    /// `status.nodeInfo` could not be turned into a host variable.
    #[error("failed to serialize node data")]
    Serialization(#[from] serde_json::Error),
}

/// What is wrong with a node that was rejected by the mapper.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeDefect {
    #[error("status.addresses is empty")]
    NoAddresses,
    #[error("role label `{0}` has no role name")]
    MalformedRoleLabel(String),
    #[error("another node with the same name was already mapped")]
    DuplicateName,
}

impl Error {
    /// Shorthand for [`Error::DataIntegrity`].
    pub fn data_integrity(node: impl Into<String>, defect: NodeDefect) -> Self {
        Error::DataIntegrity {
            node: node.into(),
            defect,
        }
    }

    /// Whether this error is rejected configuration, raised before any cluster access.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::ReadConfig { .. }
                | Error::ParseConfig { .. }
                | Error::InvalidPlugin { .. }
                | Error::EmptyGroup
                | Error::ReservedGroup(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, NodeDefect};

    #[test]
    fn data_integrity_message_names_node() {
        let err = Error::data_integrity("worker-0", NodeDefect::NoAddresses);
        assert_eq!(
            err.to_string(),
            "node `worker-0` cannot be added to the inventory: status.addresses is empty"
        );
        assert!(!err.is_configuration());
    }

    #[test]
    fn invalid_plugin_is_configuration() {
        let err = Error::InvalidPlugin {
            expected: "a.b.c",
            found: "x".into(),
        };
        assert!(err.is_configuration());
        assert!(Error::EmptyGroup.is_configuration());
        assert!(Error::ReservedGroup("all".into()).is_configuration());
    }
}
