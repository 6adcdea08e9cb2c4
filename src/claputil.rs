use std::{collections::BTreeSet, ffi::OsStr, path::PathBuf};

use clap::builder::StyledStr;
use clap_complete::engine::{ArgValueCompleter, CompletionCandidate};
use kube::config::Kubeconfig;

use crate::{
    cache::{NodeCache, cache_key},
    config::PluginConfig,
};

/// Create an `ArgValueCompleter` that lists contexts from the active kubeconfig.
///
/// The current context is offered first and marked in the candidate help.
pub fn context_value_completer() -> ArgValueCompleter {
    ArgValueCompleter::new(|input: &OsStr| -> Vec<CompletionCandidate> {
        let kubeconfig = match Kubeconfig::read() {
            Ok(config) => config,
            Err(_) => return Vec::new(),
        };

        let input = input.to_string_lossy();
        let input = input.trim();
        let current_context = kubeconfig.current_context.as_deref();

        let mut completions = Vec::new();
        for named_context in &kubeconfig.contexts {
            if !named_context.name.starts_with(input) {
                continue;
            }

            let is_current = current_context == Some(named_context.name.as_str());
            let mut details = Vec::new();
            if is_current {
                details.push(String::from("[current]"));
            }
            if let Some(ctx) = &named_context.context {
                details.push(format!("cluster={}", ctx.cluster));
            }

            let mut candidate = CompletionCandidate::new(named_context.name.as_str());
            if !details.is_empty() {
                candidate = candidate.help(Some(StyledStr::from(details.join(" "))));
            }
            if is_current {
                completions.insert(0, candidate.display_order(Some(0)));
            } else {
                completions.push(candidate);
            }
        }
        completions
    })
}

/// Create an `ArgValueCompleter` that lists node names for `--host`.
///
/// Only the node cache of the configuration at `config_path` is consulted,
/// expired or not; the cluster is never contacted. Without caching enabled in
/// that configuration there are no candidates.
///
/// Limitation: the value given to `--inventory` on the command line is not
/// considered. See https://github.com/clap-rs/clap/issues/1910 for more details.
pub fn host_value_completer(config_path: PathBuf) -> ArgValueCompleter {
    ArgValueCompleter::new(move |input: &OsStr| -> Vec<CompletionCandidate> {
        let Ok(config) = PluginConfig::from_path(&config_path) else {
            return Vec::new();
        };
        let Some(cache) = NodeCache::from_config(&config).map(NodeCache::without_expiry) else {
            return Vec::new();
        };
        let Ok(nodes) = cache.load(&cache_key(&config_path)) else {
            return Vec::new();
        };

        let input = input.to_string_lossy();
        let input = input.trim();
        nodes
            .into_iter()
            .map(|node| node.name)
            .filter(|name| name.starts_with(input))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(CompletionCandidate::new)
            .collect()
    })
}
