#![cfg_attr(not(doctest), doc = include_str!("../README.md"))]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use clap_complete;
pub use k8s_openapi;
pub use kube;

pub mod cache;
pub mod claputil;
pub use claputil::{context_value_completer, host_value_completer};
pub mod client;
pub use client::{ClusterClient, KubeClusterClient, StaticClusterClient, collect_nodes, connect};
pub mod config;
pub use config::{CONFIG_SUFFIX, PLUGIN_NAME, PluginConfig, verify_file};
mod error;
pub use error::{Error, NodeDefect};
pub mod inventory;
pub use inventory::{Inventory, InventorySink, NodeInventory, map_nodes};
pub mod node;
pub use node::ClusterNode;
pub mod plugin;
pub use plugin::{NodeSource, parse};
pub mod retry;
