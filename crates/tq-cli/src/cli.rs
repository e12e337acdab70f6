use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Local priority-submission queue and daemon for the traffic-stats API.
#[derive(Debug, Parser)]
#[command(name = "tq", version)]
pub struct Cli {
    /// Root of the on-disk layout (db, payloads/, daemon.log, daemon.pid).
    #[arg(long, env = "TQ_HOME_FOLDER")]
    pub home_folder: PathBuf,

    /// Remote host.
    #[arg(long, env = "TQ_BASE_URL")]
    pub base_url: Option<String>,

    /// Remote API version integer.
    #[arg(long, env = "TQ_VERSION")]
    pub version: Option<u32>,

    /// Remote API key.
    #[arg(long, env = "TQ_KEY")]
    pub key: Option<String>,

    /// Log verbosity (passed straight to the tracing env filter).
    #[arg(long, env = "TQ_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Scratch directory for intermediate files.
    #[arg(long, env = "TQ_TMP_FOLDER")]
    pub tmp_folder: Option<PathBuf>,

    #[arg(long, env = "TQ_PROXY_IP")]
    pub proxy_ip: Option<String>,
    #[arg(long, env = "TQ_PROXY_PORT")]
    pub proxy_port: Option<u16>,
    #[arg(long, env = "TQ_PROXY_USERNAME")]
    pub proxy_username: Option<String>,
    #[arg(long, env = "TQ_PROXY_PASSWORD")]
    pub proxy_password: Option<String>,

    /// Daemon tick period, seconds.
    #[arg(long, env = "TQ_QUEUE_LOOP_DURATION", default_value_t = 60)]
    pub queue_loop_duration: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Queue item operations.
    Queue {
        #[command(subcommand)]
        cmd: QueueCommand,
    },
    /// Daemon process lifecycle.
    Daemon {
        #[command(subcommand)]
        cmd: DaemonCommand,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReportTypeArg {
    Route,
    Area,
    Density,
}

impl From<ReportTypeArg> for tq_core::ReportType {
    fn from(value: ReportTypeArg) -> Self {
        match value {
            ReportTypeArg::Route => tq_core::ReportType::RouteAnalysis,
            ReportTypeArg::Area => tq_core::ReportType::AreaAnalysis,
            ReportTypeArg::Density => tq_core::ReportType::TrafficDensity,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// Enqueue a new job from a JSON payload file.
    Add {
        name: String,
        #[arg(long, value_enum)]
        report_type: ReportTypeArg,
        #[arg(long)]
        priority: i64,
        /// Path to the opaque JSON payload.
        payload: PathBuf,
    },
    /// List items matching a filter.
    List {
        #[arg(long)]
        name_contains: Option<String>,
        #[arg(long)]
        priority: Option<String>,
    },
    /// Print the next `n` items that would be submitted this tick.
    Next { n: usize },
    /// Update an existing item.
    Update {
        uid: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        priority: Option<i64>,
        #[arg(long)]
        cancel: Option<bool>,
        #[arg(long)]
        payload: Option<PathBuf>,
    },
    /// Drop every item and delete all auxiliary files.
    Purge,
    /// Print aggregate queue metrics.
    Stats,
}

#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    /// Start the scheduler daemon in the foreground.
    Start,
    /// Stop a running daemon by signaling its pid.
    Stop,
    /// Report whether a daemon is currently alive.
    Status,
}
