use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info, warn};

use ldap_proxy::args::Args;
use ldap_proxy::config::Config;
use ldap_proxy::{DirectoryProxy, load_config_or_create, logging};

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging(args.log_file.as_deref());

    let config = load_config_or_create(&args.config).inspect_err(|e| {
        error!(
            "Failed to load config file '{}': {:#}",
            args.config.display(),
            e
        );
    })?;
    print_targets(&config);

    if args.check {
        info!("Configuration '{}' is valid", args.config.display());
        return Ok(());
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    rt.block_on(run(config, args.probe))
}

fn print_targets(config: &Config) {
    info!("Loaded {} target(s):", config.targets.len());
    for target in &config.targets {
        info!(
            "  - {} {} [{}] policy={} v{}",
            target.name,
            target.url,
            target.naming_contexts.join("; "),
            target.credential_policy,
            target.protocol_version
        );
    }
}

async fn run(config: Config, probe: bool) -> Result<()> {
    let proxy = DirectoryProxy::new(config)?;

    if probe {
        let mut failed = 0;
        for report in proxy.probe_targets().await {
            match report.result {
                Ok(contexts) => info!(
                    "Target '{}' reachable, naming contexts: {}",
                    report.target,
                    contexts.join("; ")
                ),
                Err(e) => {
                    failed += 1;
                    warn!("Target '{}' probe failed: {}", report.target, e);
                }
            }
        }
        let status = proxy.status();
        info!(
            "Pool: {} of {} connections",
            status.connections, status.capacity
        );
        proxy.shutdown();
        if failed > 0 {
            bail!("{failed} target(s) failed the probe");
        }
        return Ok(());
    }

    proxy.shutdown();
    Ok(())
}
