//! Sources of node objects: a live cluster or a pre-fetched node list.

use std::{future::Future, path::Path};

use anyhow::Context;
use futures::{StreamExt, TryStreamExt, stream};
use k8s_openapi::api::core::v1::Node;
use kube::{
    Api, Client, Config,
    api::ListParams,
    config::{KubeConfigOptions, Kubeconfig},
};
use serde::Deserialize;
use tracing::debug;

use crate::{
    Error,
    node::ClusterNode,
    retry::{ApiRetryExt, RetryPolicy},
};

/// Upper bound on node detail requests in flight.
const FETCH_CONCURRENCY: usize = 8;

/// Read access to the nodes of a cluster.
pub trait ClusterClient {
    /// Names of all nodes, in listing order.
    fn list_nodes(&self) -> impl Future<Output = Result<Vec<String>, Error>>;

    /// Full object of a single node.
    fn get_node(&self, name: &str) -> impl Future<Output = Result<Node, Error>>;
}

/// List every node and fetch its details.
///
/// The returned nodes keep the listing order.
pub async fn collect_nodes<C: ClusterClient>(client: &C) -> Result<Vec<ClusterNode>, Error> {
    let names = client.list_nodes().await?;
    debug!(count = names.len(), "listed cluster nodes");

    stream::iter(names)
        .map(|name| async move {
            client
                .get_node(&name)
                .await
                .and_then(ClusterNode::try_from)
        })
        .buffered(FETCH_CONCURRENCY)
        .try_collect()
        .await
}

/// Build a client for `context` from the kubeconfig, or infer the
/// configuration (kubeconfig current context, then in-cluster) when `None`.
pub async fn connect(context: Option<&str>) -> anyhow::Result<Client> {
    let config = match context {
        Some(context) => {
            let options = KubeConfigOptions {
                context: Some(context.to_string()),
                ..Default::default()
            };
            let kubeconfig = Kubeconfig::read().context("failed to read kubeconfig")?;
            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .with_context(|| format!("failed to load kubeconfig context {context:?}"))?
        }
        None => Config::infer()
            .await
            .context("failed to infer Kubernetes configuration")?,
    };
    Client::try_from(config).context("failed to create Kubernetes client")
}

/// [`ClusterClient`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeClusterClient {
    api: Api<Node>,
    policy: RetryPolicy,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl ClusterClient for KubeClusterClient {
    fn list_nodes(&self) -> impl Future<Output = Result<Vec<String>, Error>> {
        async move {
            let nodes = self
                .api
                .list_metadata_with_retry(self.policy, &ListParams::default())
                .await?;
            nodes
                .items
                .into_iter()
                .map(|node| node.metadata.name.ok_or(Error::MissingNodeName))
                .collect()
        }
    }

    fn get_node(&self, name: &str) -> impl Future<Output = Result<Node, Error>> {
        async move { Ok(self.api.get_with_retry(self.policy, name).await?) }
    }
}

/// [`ClusterClient`] over nodes fetched ahead of time.
#[derive(Debug, Clone, Default)]
pub struct StaticClusterClient {
    nodes: Vec<Node>,
}

/// `kubectl get nodes -o json` output; only `items` is read.
#[derive(Deserialize)]
struct NodeItems {
    items: Vec<Node>,
}

impl StaticClusterClient {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Parse a `kubectl get nodes -o json` (or `oc get nodes -o json`) document.
    pub fn from_json(data: &str) -> anyhow::Result<Self> {
        let list: NodeItems = serde_json::from_str(data).context("failed to parse node list")?;
        Ok(Self::new(list.items))
    }

    /// Load nodes from a file written by `kubectl get nodes -o json`.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        std::fs::read_to_string(path)
            .context("failed to read node list")
            .and_then(|data| Self::from_json(&data))
            .map_err(|source| Error::NodesFile {
                path: path.to_path_buf(),
                source: source.into(),
            })
    }
}

impl ClusterClient for StaticClusterClient {
    fn list_nodes(&self) -> impl Future<Output = Result<Vec<String>, Error>> {
        let names: Result<Vec<String>, Error> = self
            .nodes
            .iter()
            .map(|node| node.metadata.name.clone().ok_or(Error::MissingNodeName))
            .collect();
        async move { names }
    }

    fn get_node(&self, name: &str) -> impl Future<Output = Result<Node, Error>> {
        let node = self
            .nodes
            .iter()
            .find(|node| node.metadata.name.as_deref() == Some(name))
            .cloned()
            .ok_or_else(|| Error::NodeNotFound(name.to_string()));
        async move { node }
    }
}
