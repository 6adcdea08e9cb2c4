use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{config::PluginConfig, node::ClusterNode};

/// Snapshot of fetched nodes, stored as JSON.
#[derive(Debug, Serialize, Deserialize)]
struct NodeCacheFile {
    fetched_at_unix_secs: u64,
    nodes: Vec<ClusterNode>,
}

/// File-backed cache of the node list, one file per configuration source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCache {
    dir: PathBuf,
    timeout: Duration,
}

impl NodeCache {
    /// `timeout` of zero means cached nodes never expire.
    pub fn new(dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            timeout,
        }
    }

    /// Cache described by `config`, or `None` when caching is disabled or no
    /// cache directory can be determined.
    pub fn from_config(config: &PluginConfig) -> Option<Self> {
        if !config.cache {
            return None;
        }
        let dir = match &config.cache_connection {
            Some(dir) => dir.clone(),
            None => default_cache_dir()?,
        };
        Some(Self::new(dir, config.cache_timeout()))
    }

    /// The same cache with expiry disabled.
    pub fn without_expiry(self) -> Self {
        Self {
            timeout: Duration::ZERO,
            ..self
        }
    }

    /// Location of the cache file for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let sanitized_key = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
                    ch
                } else {
                    '_'
                }
            })
            .collect::<String>();
        self.dir.join(format!("{sanitized_key}.json"))
    }

    /// Load cached nodes for `key`.
    ///
    /// Fails when the cache file is missing, unreadable, or expired.
    pub fn load(&self, key: &str) -> anyhow::Result<Vec<ClusterNode>> {
        let path = self.path_for(key);
        let data = fs::read(&path)
            .with_context(|| format!("failed to read node cache file {path:?}"))?;
        let cache: NodeCacheFile = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse node cache file {path:?}"))?;

        if !self.timeout.is_zero() {
            let age = Duration::from_secs(now_unix_secs().saturating_sub(cache.fetched_at_unix_secs));
            if age > self.timeout {
                return Err(anyhow::anyhow!(
                    "node cache expired at {path:?} (age: {age:?}, timeout: {:?})",
                    self.timeout
                ));
            }
        }

        Ok(cache.nodes)
    }

    /// Store `nodes` for `key`, replacing any previous snapshot.
    pub fn save(&self, key: &str, nodes: &[ClusterNode]) -> anyhow::Result<()> {
        self.save_at(key, nodes, now_unix_secs())
    }

    fn save_at(&self, key: &str, nodes: &[ClusterNode], fetched_at_unix_secs: u64) -> anyhow::Result<()> {
        let path = self.path_for(key);
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create cache directory at {:?}", self.dir))?;

        let cache = NodeCacheFile {
            fetched_at_unix_secs,
            nodes: nodes.to_vec(),
        };
        let bytes =
            serde_json::to_vec(&cache).context("failed to serialize node cache data to JSON")?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, bytes)
            .with_context(|| format!("failed to write node cache to {tmp_path:?}"))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("failed to move node cache into place at {path:?}"))?;
        Ok(())
    }
}

/// Cache key for a configuration file: its absolute path when resolvable.
pub fn cache_key(config_path: &Path) -> String {
    let path = fs::canonicalize(config_path).unwrap_or_else(|_| config_path.to_path_buf());
    path.to_string_lossy().into_owned()
}

fn default_cache_dir() -> Option<PathBuf> {
    Some(dirs::cache_dir()?.join("ocnodes"))
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}
