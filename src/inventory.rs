//! Mapping of cluster nodes into Ansible groups, hosts and variables.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::{
    Error, NodeDefect,
    node::{ClusterNode, NodeAddress},
};

/// Group used when the configuration does not name one.
pub const DEFAULT_GROUP: &str = "openshift_nodes";

/// Label domain whose keys carry node roles, e.g. `node-role.kubernetes.io/worker`.
pub const ROLE_LABEL_PREFIX: &str = "node-role.kubernetes.io";

/// Group that Ansible reports hosts without any other group under.
const UNGROUPED: &str = "ungrouped";

/// Top-level keys of Ansible's inventory output that cannot name a group.
pub const RESERVED_GROUPS: [&str; 3] = ["_meta", "all", UNGROUPED];

/// Reject group names the inventory output cannot represent.
pub fn check_group_name(group_name: &str) -> Result<(), Error> {
    if group_name.is_empty() {
        return Err(Error::EmptyGroup);
    }
    if RESERVED_GROUPS.contains(&group_name) {
        return Err(Error::ReservedGroup(group_name.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryGroup {
    pub name: String,
    pub hosts: BTreeSet<String>,
    pub vars: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryHost {
    pub name: String,
    pub vars: HostVars,
}

/// Variables attached to every host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostVars {
    pub ansible_host: String,
    pub node_roles: Vec<String>,
    pub node_labels: BTreeMap<String, String>,
    pub node_annotations: BTreeMap<String, String>,
    pub node_info: Option<Value>,
    pub node_addresses: Vec<NodeAddress>,
    pub node_ready: bool,
}

impl HostVars {
    /// Variables as name/value pairs, `ansible_host` first.
    pub fn variables(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("ansible_host", json!(self.ansible_host)),
            ("node_roles", json!(self.node_roles)),
            ("node_labels", json!(self.node_labels)),
            ("node_annotations", json!(self.node_annotations)),
            ("node_info", self.node_info.clone().unwrap_or(Value::Null)),
            ("node_addresses", json!(self.node_addresses)),
            ("node_ready", json!(self.node_ready)),
        ]
    }
}

/// Result of mapping one snapshot of nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInventory {
    pub group: InventoryGroup,
    pub hosts: Vec<InventoryHost>,
}

/// Receiver of the calls that populate an inventory.
pub trait InventorySink {
    fn add_group(&mut self, group: &str);
    fn set_group_variable(&mut self, group: &str, key: &str, value: Value);
    fn add_host(&mut self, host: &str);
    fn add_host_to_group(&mut self, group: &str, host: &str);
    fn set_host_variable(&mut self, host: &str, key: &str, value: Value);
}

/// Map `nodes` into a single group named `group_name`.
///
/// Every node becomes one host. A node that cannot be mapped faithfully aborts
/// the whole mapping; no partial inventory is returned.
pub fn map_nodes(
    nodes: &[ClusterNode],
    group_name: &str,
    group_vars: &Map<String, Value>,
) -> Result<NodeInventory, Error> {
    check_group_name(group_name)?;

    let mut group = InventoryGroup {
        name: group_name.to_string(),
        hosts: BTreeSet::new(),
        vars: group_vars.clone(),
    };
    let mut hosts = Vec::with_capacity(nodes.len());

    for node in nodes {
        let host = map_node(node)?;
        if !group.hosts.insert(host.name.clone()) {
            return Err(Error::data_integrity(&node.name, NodeDefect::DuplicateName));
        }
        debug!(
            node = %host.name,
            address = %host.vars.ansible_host,
            ready = host.vars.node_ready,
            "mapped node"
        );
        hosts.push(host);
    }

    Ok(NodeInventory { group, hosts })
}

fn map_node(node: &ClusterNode) -> Result<InventoryHost, Error> {
    let ansible_host = node
        .primary_address()
        .ok_or_else(|| Error::data_integrity(&node.name, NodeDefect::NoAddresses))?
        .to_string();

    let node_roles = node_roles(&node.labels)
        .map_err(|defect| Error::data_integrity(&node.name, defect))?;

    Ok(InventoryHost {
        name: node.name.clone(),
        vars: HostVars {
            ansible_host,
            node_roles,
            node_labels: node.labels.clone(),
            node_annotations: node.annotations.clone(),
            node_info: node.node_info.clone(),
            node_addresses: node.addresses.clone(),
            node_ready: node.is_ready(),
        },
    })
}

/// Roles named by `node-role.kubernetes.io/<role>` label keys, in label order.
pub fn node_roles(labels: &BTreeMap<String, String>) -> Result<Vec<String>, NodeDefect> {
    let mut roles = Vec::new();
    for key in labels.keys() {
        match key.split_once('/') {
            Some((ROLE_LABEL_PREFIX, "")) => {
                return Err(NodeDefect::MalformedRoleLabel(key.clone()));
            }
            Some((ROLE_LABEL_PREFIX, role)) => roles.push(role.to_string()),
            None if key == ROLE_LABEL_PREFIX => {
                return Err(NodeDefect::MalformedRoleLabel(key.clone()));
            }
            _ => {}
        }
    }
    Ok(roles)
}

impl NodeInventory {
    /// Replay this inventory into `sink`.
    pub fn apply<S: InventorySink + ?Sized>(&self, sink: &mut S) {
        let group = &self.group.name;
        sink.add_group(group);
        for (key, value) in &self.group.vars {
            sink.set_group_variable(group, key, value.clone());
        }

        for host in &self.hosts {
            let mut variables = host.vars.variables().into_iter();
            sink.add_host(&host.name);
            if let Some((key, value)) = variables.next() {
                sink.set_host_variable(&host.name, key, value);
            }
            sink.add_host_to_group(group, &host.name);
            for (key, value) in variables {
                sink.set_host_variable(&host.name, key, value);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct GroupEntry {
    hosts: BTreeSet<String>,
    vars: Map<String, Value>,
}

/// In-memory inventory rendered in Ansible's dynamic inventory script format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    groups: BTreeMap<String, GroupEntry>,
    hosts: BTreeMap<String, Map<String, Value>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn group_hosts(&self, group: &str) -> Option<&BTreeSet<String>> {
        self.groups.get(group).map(|entry| &entry.hosts)
    }

    pub fn group_vars(&self, group: &str) -> Option<&Map<String, Value>> {
        self.groups.get(group).map(|entry| &entry.vars)
    }

    pub fn host_names(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    pub fn host_vars(&self, host: &str) -> Option<&Map<String, Value>> {
        self.hosts.get(host)
    }

    /// Output for `--list`.
    pub fn to_list_json(&self) -> Value {
        let mut output = Map::new();

        let mut hostvars = Map::new();
        for (host, vars) in &self.hosts {
            hostvars.insert(host.clone(), Value::Object(vars.clone()));
        }
        output.insert("_meta".into(), json!({ "hostvars": hostvars }));

        let grouped: BTreeSet<&String> = self
            .groups
            .values()
            .flat_map(|entry| entry.hosts.iter())
            .collect();
        let ungrouped: Vec<&String> = self
            .hosts
            .keys()
            .filter(|host| !grouped.contains(host))
            .collect();

        let mut children: Vec<&str> = self.group_names().collect();
        children.push(UNGROUPED);
        output.insert("all".into(), json!({ "children": children }));

        for (name, entry) in &self.groups {
            output.insert(
                name.clone(),
                json!({ "hosts": entry.hosts, "vars": entry.vars }),
            );
        }
        if !ungrouped.is_empty() {
            output.insert(UNGROUPED.into(), json!({ "hosts": ungrouped }));
        }

        Value::Object(output)
    }

    /// Output for `--host`; unknown hosts yield an empty object.
    pub fn to_host_json(&self, host: &str) -> Value {
        Value::Object(self.host_vars(host).cloned().unwrap_or_default())
    }
}

impl InventorySink for Inventory {
    fn add_group(&mut self, group: &str) {
        self.groups.entry(group.to_string()).or_default();
    }

    fn set_group_variable(&mut self, group: &str, key: &str, value: Value) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .vars
            .insert(key.to_string(), value);
    }

    fn add_host(&mut self, host: &str) {
        self.hosts.entry(host.to_string()).or_default();
    }

    fn add_host_to_group(&mut self, group: &str, host: &str) {
        self.add_host(host);
        self.groups
            .entry(group.to_string())
            .or_default()
            .hosts
            .insert(host.to_string());
    }

    fn set_host_variable(&mut self, host: &str, key: &str, value: Value) {
        self.hosts
            .entry(host.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }
}
