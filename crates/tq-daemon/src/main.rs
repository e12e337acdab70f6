use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tq_core::Home;
use tq_daemon::{DEFAULT_CAP, PidFile};
use tq_remote::{AdapterConfig, HttpRemoteAdapter, ProxyConfig};
use tracing_subscriber::EnvFilter;

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn required_env(key: &str) -> Result<String> {
    env_var(key).with_context(|| format!("{key} is not set"))
}

fn build_adapter_config() -> Result<AdapterConfig> {
    let proxy = ProxyConfig::from_parts(
        env_var("TQ_PROXY_IP"),
        env_var("TQ_PROXY_PORT").map(|v| v.parse()).transpose()?,
        env_var("TQ_PROXY_USERNAME"),
        env_var("TQ_PROXY_PASSWORD"),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    Ok(AdapterConfig {
        base_url: required_env("TQ_BASE_URL")?,
        version: required_env("TQ_VERSION")?.parse()?,
        key: required_env("TQ_KEY")?,
        proxy,
        ..Default::default()
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let home = Home::new(required_env("TQ_HOME_FOLDER")?);

    let log_level = env_var("TQ_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
    let file_appender = tracing_appender::rolling::never(home.root(), "daemon.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .with_writer(non_blocking)
        .init();

    let adapter_config = build_adapter_config()?;
    let adapter: Arc<dyn tq_remote::RemoteAdapter + Send + Sync> =
        Arc::new(HttpRemoteAdapter::new(adapter_config)?);

    let tick_duration = env_var("TQ_QUEUE_LOOP_DURATION")
        .map(|v| v.parse::<u64>())
        .transpose()?
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(60));

    let pidfile = PidFile::new(home.daemon_pid_path());

    tq_daemon::run(home, adapter, tick_duration, DEFAULT_CAP, pidfile).await
}
