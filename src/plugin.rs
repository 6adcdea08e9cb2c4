//! Builds the inventory for one configuration source.

use tracing::{debug, info, warn};

use crate::{
    Error,
    cache::NodeCache,
    client::{ClusterClient, collect_nodes},
    config::PluginConfig,
    inventory::{InventorySink, map_nodes},
    node::ClusterNode,
};

/// Where nodes come from for one run.
pub struct NodeSource<'a, C> {
    pub client: &'a C,
    /// Cache and the key of this configuration source, when caching is enabled.
    pub cache: Option<(&'a NodeCache, &'a str)>,
    /// `false` skips reading the cache; fetched nodes are still written back.
    pub use_cache: bool,
}

impl<'a, C> NodeSource<'a, C> {
    /// Nodes are always fetched from `client`.
    pub fn live(client: &'a C) -> Self {
        Self {
            client,
            cache: None,
            use_cache: false,
        }
    }

    pub fn with_cache(mut self, cache: &'a NodeCache, key: &'a str, use_cache: bool) -> Self {
        self.cache = Some((cache, key));
        self.use_cache = use_cache;
        self
    }
}

/// Populate `sink` with the nodes described by `config`.
///
/// The configuration is validated before the cluster is contacted, and the
/// sink is only touched once every node has been mapped.
pub async fn parse<C, S>(
    config: &PluginConfig,
    source: NodeSource<'_, C>,
    sink: &mut S,
) -> Result<(), Error>
where
    C: ClusterClient,
    S: InventorySink + ?Sized,
{
    config.validate()?;

    let nodes = load_nodes(config, &source).await?;
    let inventory = map_nodes(&nodes, config.group_name(), &config.group_vars())?;
    inventory.apply(sink);

    info!(
        group = %inventory.group.name,
        hosts = inventory.hosts.len(),
        "built node inventory"
    );
    Ok(())
}

async fn load_nodes<C: ClusterClient>(
    config: &PluginConfig,
    source: &NodeSource<'_, C>,
) -> Result<Vec<ClusterNode>, Error> {
    let cache = source.cache.filter(|_| config.cache);

    if let Some((cache, key)) = cache.filter(|_| source.use_cache) {
        match cache.load(key) {
            Ok(nodes) => {
                debug!(key, count = nodes.len(), "using cached nodes");
                return Ok(nodes);
            }
            Err(err) => debug!(key, error = %format!("{err:#}"), "node cache miss"),
        }
    }

    let nodes = collect_nodes(source.client).await?;

    if let Some((cache, key)) = cache {
        if let Err(err) = cache.save(key, &nodes) {
            warn!(key, error = %format!("{err:#}"), "failed to update node cache");
        }
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use std::{
        future::Future,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use k8s_openapi::api::core::v1::Node;
    use serde_json::json;

    use super::{NodeSource, parse};
    use crate::{
        Error, NodeDefect,
        cache::NodeCache,
        client::{ClusterClient, StaticClusterClient},
        config::PluginConfig,
        inventory::Inventory,
    };

    /// Static client that counts list calls.
    struct CountingClient {
        inner: StaticClusterClient,
        lists: AtomicUsize,
    }

    impl CountingClient {
        fn new(nodes: Vec<serde_json::Value>) -> Self {
            Self {
                inner: StaticClusterClient::new(
                    nodes
                        .into_iter()
                        .map(|value| serde_json::from_value::<Node>(value).expect("valid node"))
                        .collect(),
                ),
                lists: AtomicUsize::new(0),
            }
        }

        fn lists(&self) -> usize {
            self.lists.load(Ordering::SeqCst)
        }
    }

    impl ClusterClient for CountingClient {
        fn list_nodes(&self) -> impl Future<Output = Result<Vec<String>, Error>> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.inner.list_nodes()
        }

        fn get_node(&self, name: &str) -> impl Future<Output = Result<Node, Error>> {
            self.inner.get_node(name)
        }
    }

    fn master_node() -> serde_json::Value {
        json!({
            "apiVersion": "v1",
            "kind": "Node",
            "metadata": {
                "name": "node1",
                "labels": {"node-role.kubernetes.io/master": ""},
                "annotations": {},
            },
            "status": {
                "addresses": [{"type": "InternalIP", "address": "10.0.0.5"}],
                "conditions": [{"type": "Ready", "status": "True"}],
            },
        })
    }

    fn config(yaml: &str) -> PluginConfig {
        serde_yaml::from_str(yaml).expect("valid yaml")
    }

    #[tokio::test]
    async fn builds_inventory_for_configured_group() {
        let client = CountingClient::new(vec![master_node()]);
        let config = config(
            "plugin: oddbit.openshift.ocnodes\ngroup: cluster_nodes\ngroup_vars:\n  ansible_user: core\n",
        );
        let mut inventory = Inventory::new();

        parse(&config, NodeSource::live(&client), &mut inventory)
            .await
            .expect("parses");

        let hosts = inventory.group_hosts("cluster_nodes").expect("group exists");
        assert!(hosts.contains("node1"));
        assert_eq!(
            inventory.group_vars("cluster_nodes").unwrap()["ansible_user"],
            json!("core")
        );
        let vars = inventory.host_vars("node1").expect("host exists");
        assert_eq!(vars["ansible_host"], json!("10.0.0.5"));
        assert_eq!(vars["node_roles"], json!(["master"]));
        assert_eq!(vars["node_ready"], json!(true));
        assert_eq!(vars["node_info"], json!(null));
    }

    #[tokio::test]
    async fn wrong_plugin_never_reaches_cluster() {
        let client = CountingClient::new(vec![master_node()]);
        let config = config("plugin: community.general.ocnodes\n");
        let mut inventory = Inventory::new();

        let err = parse(&config, NodeSource::live(&client), &mut inventory)
            .await
            .expect_err("invalid plugin");

        assert!(matches!(err, Error::InvalidPlugin { .. }));
        assert_eq!(client.lists(), 0);
        assert_eq!(inventory, Inventory::new());
    }

    #[tokio::test]
    async fn malformed_node_leaves_sink_untouched() {
        let client = CountingClient::new(vec![
            master_node(),
            json!({
                "apiVersion": "v1",
                "kind": "Node",
                "metadata": {"name": "no-address"},
                "status": {"addresses": []},
            }),
        ]);
        let config = config("plugin: oddbit.openshift.ocnodes\n");
        let mut inventory = Inventory::new();

        let err = parse(&config, NodeSource::live(&client), &mut inventory)
            .await
            .expect_err("node without address");

        assert!(matches!(
            err,
            Error::DataIntegrity { ref node, defect: NodeDefect::NoAddresses } if node == "no-address"
        ));
        assert_eq!(inventory, Inventory::new());
    }

    #[tokio::test]
    async fn cached_nodes_are_reused_until_refresh() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = NodeCache::new(dir.path(), Duration::from_secs(600));
        let client = CountingClient::new(vec![master_node()]);
        let config = config("plugin: oddbit.openshift.ocnodes\ncache: true\n");

        let mut first = Inventory::new();
        parse(&config, NodeSource::live(&client).with_cache(&cache, "inv", true), &mut first)
            .await
            .expect("first run");
        assert_eq!(client.lists(), 1);

        let mut second = Inventory::new();
        parse(&config, NodeSource::live(&client).with_cache(&cache, "inv", true), &mut second)
            .await
            .expect("cached run");
        assert_eq!(client.lists(), 1);
        assert_eq!(first, second);

        let mut refreshed = Inventory::new();
        parse(&config, NodeSource::live(&client).with_cache(&cache, "inv", false), &mut refreshed)
            .await
            .expect("refresh run");
        assert_eq!(client.lists(), 2);
        assert_eq!(first, refreshed);
    }

    #[tokio::test]
    async fn cache_is_ignored_when_disabled_in_config() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = NodeCache::new(dir.path(), Duration::ZERO);
        let client = CountingClient::new(vec![master_node()]);
        let config = config("plugin: oddbit.openshift.ocnodes\n");

        for _ in 0..2 {
            let mut inventory = Inventory::new();
            parse(&config, NodeSource::live(&client).with_cache(&cache, "inv", true), &mut inventory)
                .await
                .expect("parses");
        }
        assert_eq!(client.lists(), 2);
        assert!(!cache.path_for("inv").exists());
    }
}
