use std::{io::Write, num::NonZeroUsize, path::PathBuf};

use anyhow::Context;
use clap::{ArgGroup, CommandFactory, Parser};
use ocnodes::{
    Inventory, KubeClusterClient, NodeSource, PluginConfig, StaticClusterClient,
    cache::{NodeCache, cache_key},
    clap_complete::CompleteEnv,
    client::ClusterClient,
    connect,
    retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy}, context_value_completer, host_value_completer, verify_file,
};
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "OCNODES_CONFIG";
const DEFAULT_CONFIG: &str = "openshift.yaml";

fn default_config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

#[derive(Debug, Parser)]
#[command(
    name = "ocnodes",
    version,
    about = "Ansible dynamic inventory of Kubernetes/OpenShift nodes",
    group(ArgGroup::new("mode").required(true).args(["list", "host"]))
)]
struct Cli {
    /// Print the whole inventory.
    #[arg(long)]
    list: bool,

    /// Print the variables of a single host.
    #[arg(long, value_name = "NAME", add = host_value_completer(default_config_path()))]
    host: Option<String>,

    /// Plugin configuration file; its name must end with `openshift.yaml`.
    #[arg(short, long, env = CONFIG_ENV, default_value = DEFAULT_CONFIG)]
    inventory: PathBuf,

    /// Kubernetes context to query instead of the current one.
    #[arg(long, add = context_value_completer(), conflicts_with = "nodes_file")]
    context: Option<String>,

    /// Read nodes from `kubectl get nodes -o json` output instead of the cluster.
    #[arg(long, value_name = "PATH")]
    nodes_file: Option<PathBuf>,

    /// Attempts per cluster request before a transient failure is reported.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: NonZeroUsize,

    /// Do not read cached nodes; the cache is still refreshed.
    #[arg(long)]
    refresh_cache: bool,

    /// Pretty-print JSON output.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    CompleteEnv::with_factory(Cli::command).complete();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if !verify_file(&cli.inventory) {
        anyhow::bail!(
            "{:?} is not an inventory source for this plugin (expected an existing file ending in `{}`)",
            cli.inventory,
            ocnodes::CONFIG_SUFFIX
        );
    }
    let config = PluginConfig::from_path(&cli.inventory)?;

    let inventory = match &cli.nodes_file {
        Some(path) => build(&cli, &config, &StaticClusterClient::from_file(path)?).await?,
        None => {
            let client = connect(cli.context.as_deref()).await?;
            let policy = RetryPolicy::default().with_max_attempts(cli.max_attempts);
            let client = KubeClusterClient::new(client).with_retry_policy(policy);
            build(&cli, &config, &client).await?
        }
    };

    let output = match &cli.host {
        Some(host) => inventory.to_host_json(host),
        None => inventory.to_list_json(),
    };
    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}").context("failed to write inventory")?;
    Ok(())
}

async fn build<C: ClusterClient>(
    cli: &Cli,
    config: &PluginConfig,
    client: &C,
) -> anyhow::Result<Inventory> {
    let cache = NodeCache::from_config(config);
    let key = cache_key(&cli.inventory);

    let mut source = NodeSource::live(client);
    if let Some(cache) = &cache {
        source = source.with_cache(cache, &key, !cli.refresh_cache);
    }

    let mut inventory = Inventory::new();
    ocnodes::parse(config, source, &mut inventory)
        .await
        .with_context(|| format!("failed to build inventory from {:?}", cli.inventory))?;
    Ok(inventory)
}
