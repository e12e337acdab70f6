use anyhow::{Context, Result};
use tq_core::Home;
use tq_remote::{AdapterConfig, HttpRemoteAdapter, ProxyConfig};

use crate::cli::Cli;

pub fn home(cli: &Cli) -> Home {
    Home::new(&cli.home_folder)
}

/// Builds the remote adapter from CLI/env configuration. Fails with the same
/// `Misconfigured` kind the adapter itself would raise if required fields
/// are missing, so the CLI can map it to exit code 1.
pub fn remote_adapter(cli: &Cli) -> Result<HttpRemoteAdapter> {
    let proxy = ProxyConfig::from_parts(
        cli.proxy_ip.clone(),
        cli.proxy_port,
        cli.proxy_username.clone(),
        cli.proxy_password.clone(),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    let cfg = AdapterConfig {
        base_url: cli
            .base_url
            .clone()
            .context("--base-url / TQ_BASE_URL is required")?,
        version: cli.version.context("--version / TQ_VERSION is required")?,
        key: cli.key.clone().context("--key / TQ_KEY is required")?,
        proxy,
        ..Default::default()
    };

    HttpRemoteAdapter::new(cfg).map_err(|e| anyhow::anyhow!(e))
}
