mod cli;
mod config;
mod table;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cli::{Cli, Command, DaemonCommand, QueueCommand};
use tq_core::{Admin, Filter, PriorityPredicate};
use tq_daemon::PidFile;
use tracing_subscriber::EnvFilter;

fn init_logging(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level.to_string()))
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Misconfigured / Forbidden / IllegalTransition / stale-daemon
            // refusals all surface here as a plain non-zero exit.
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Command::Queue { cmd } => run_queue(&cli, cmd),
        Command::Daemon { cmd } => run_daemon(&cli, cmd).await,
    }
}

fn run_queue(cli: &Cli, cmd: &QueueCommand) -> anyhow::Result<()> {
    let admin = Admin::new(config::home(cli));

    match cmd {
        QueueCommand::Add {
            name,
            report_type,
            priority,
            payload,
        } => {
            let bytes = std::fs::read(payload)?;
            let item = admin.add(name.clone(), &bytes, (*report_type).into(), *priority)?;
            println!("added {} (uid={})", item.name, item.uid);
        }
        QueueCommand::List {
            name_contains,
            priority,
        } => {
            let filter = Filter {
                name_substrings: name_contains.clone().map(|s| vec![s]),
                priority_predicates: priority
                    .as_ref()
                    .map(|p| -> anyhow::Result<Vec<PriorityPredicate>> {
                        Ok(vec![p.parse().map_err(|e: String| anyhow::anyhow!(e))?])
                    })
                    .transpose()?,
                ..Default::default()
            };
            table::print_items(&admin.list(&filter)?);
        }
        QueueCommand::Next { n } => {
            table::print_items(&admin.list_next(*n)?);
        }
        QueueCommand::Update {
            uid,
            name,
            priority,
            cancel,
            payload,
        } => {
            let bytes = payload.as_ref().map(std::fs::read).transpose()?;
            let item = admin.update(
                uid,
                name.clone(),
                *priority,
                *cancel,
                bytes.as_deref(),
            )?;
            println!("updated {} (status={:?})", item.uid, item.status());
        }
        QueueCommand::Purge => {
            admin.purge()?;
            println!("purged");
        }
        QueueCommand::Stats => {
            table::print_metrics(&admin.describe()?);
        }
    }
    Ok(())
}

async fn run_daemon(cli: &Cli, cmd: &DaemonCommand) -> anyhow::Result<()> {
    let home = config::home(cli);
    let pidfile = PidFile::new(home.daemon_pid_path());

    match cmd {
        DaemonCommand::Start => {
            let adapter: Arc<dyn tq_remote::RemoteAdapter + Send + Sync> =
                Arc::new(config::remote_adapter(cli)?);
            let tick_duration = Duration::from_secs(cli.queue_loop_duration);
            tq_daemon::run(home, adapter, tick_duration, tq_daemon::DEFAULT_CAP, pidfile).await
        }
        DaemonCommand::Stop => {
            let Some(pid) = pidfile.status()? else {
                anyhow::bail!("no daemon is running");
            };
            // SAFETY: pid was just confirmed alive via kill(pid, 0).
            let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
            if rc != 0 {
                anyhow::bail!("failed to signal pid {pid}");
            }
            println!("stopped daemon (pid={pid})");
            Ok(())
        }
        DaemonCommand::Status => match pidfile.status()? {
            Some(pid) => {
                println!("daemon running (pid={pid})");
                Ok(())
            }
            None => {
                println!("daemon not running");
                Ok(())
            }
        },
    }
}
