//! Plugin configuration file, e.g. `inventory/openshift.yaml`:
//!
//! ```yaml
//! plugin: oddbit.openshift.ocnodes
//! group: cluster_nodes
//! group_vars:
//!   ansible_user: core
//! cache: true
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    Error,
    inventory::{DEFAULT_GROUP, check_group_name},
};

/// Value the `plugin` option must carry.
pub const PLUGIN_NAME: &str = "oddbit.openshift.ocnodes";

/// Suffix a configuration file name must end with to be handled by this plugin.
pub const CONFIG_SUFFIX: &str = "openshift.yaml";

const DEFAULT_CACHE_TIMEOUT_SECS: u64 = 3600;

/// Options read from the configuration file. Unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PluginConfig {
    pub plugin: String,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    group_vars: Option<Map<String, Value>>,
    /// Whether fetched nodes are cached between runs.
    #[serde(default)]
    pub cache: bool,
    /// Seconds a cached node list stays valid; `0` never expires.
    #[serde(default = "default_cache_timeout")]
    pub cache_timeout: u64,
    /// Directory holding cache files.
    #[serde(default)]
    pub cache_connection: Option<PathBuf>,
}

fn default_cache_timeout() -> u64 {
    DEFAULT_CACHE_TIMEOUT_SECS
}

impl PluginConfig {
    /// Read and validate the configuration at `path`.
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let data = fs::read_to_string(path).map_err(|source| Error::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PluginConfig =
            serde_yaml::from_str(&data).map_err(|source| Error::ParseConfig {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configuration meant for another plugin, or naming an empty or
    /// reserved group.
    pub fn validate(&self) -> Result<(), Error> {
        if self.plugin != PLUGIN_NAME {
            return Err(Error::InvalidPlugin {
                expected: PLUGIN_NAME,
                found: self.plugin.clone(),
            });
        }
        check_group_name(self.group_name())
    }

    pub fn group_name(&self) -> &str {
        self.group.as_deref().unwrap_or(DEFAULT_GROUP)
    }

    pub fn group_vars(&self) -> Map<String, Value> {
        self.group_vars.clone().unwrap_or_default()
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_timeout)
    }
}

/// Whether `path` is a configuration file this plugin handles.
pub fn verify_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().ends_with(CONFIG_SUFFIX))
}
