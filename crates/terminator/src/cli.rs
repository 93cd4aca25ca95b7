//! Command-line configuration

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use terminator_lib::resolver::DEFAULT_PAGE_LIMIT;
use terminator_lib::TerminatorLoopBuilder;

/// OOM Terminator
#[derive(Debug, Parser)]
#[command(name = "oom-terminator")]
#[command(author, version, about = "OOM Terminator: gracefully terminates pods before they hit their memory limit", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Watch pods and terminate the ones staying over the memory limit
    Terminate(TerminateArgs),
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, Args)]
pub struct TerminateArgs {
    /// Kube config file path, default is in-cluster config
    #[arg(long, short = 'c', env = "OOM_TERMINATOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use the local ~/.kube/config file
    #[arg(long, env = "OOM_TERMINATOR_LOCAL")]
    pub local: bool,

    /// Will not delete pods, only log when they reach the limit
    #[arg(long, env = "OOM_TERMINATOR_DRY_RUN")]
    pub dry_run: bool,

    /// Log every step
    #[arg(long, env = "OOM_TERMINATOR_DEBUG")]
    pub debug: bool,

    /// Namespace to look for pods in, all namespaces if empty
    #[arg(long, env = "OOM_TERMINATOR_NAMESPACE", default_value = "")]
    pub namespace: String,

    /// Services to get the pods from
    #[arg(long, env = "OOM_TERMINATOR_SERVICES", value_delimiter = ',')]
    pub services: Vec<String>,

    /// Deployments to get the pods from
    #[arg(long, env = "OOM_TERMINATOR_DEPLOYMENTS", value_delimiter = ',')]
    pub deployments: Vec<String>,

    /// Memory usage percentage limit
    #[arg(long, short = 'l', env = "OOM_TERMINATOR_LIMIT", default_value_t = 95)]
    pub limit: u32,

    /// Milliseconds to sleep between checks
    #[arg(long, short = 't', env = "OOM_TERMINATOR_SLEEP", default_value_t = 1000)]
    pub sleep: u64,

    /// Milliseconds to sleep after killing a pod
    #[arg(long, env = "OOM_TERMINATOR_KILL_SLEEP", default_value_t = 1000)]
    pub kill_sleep: u64,

    /// Checks a pod must stay over the limit, after the first, before it is killed
    #[arg(long, env = "OOM_TERMINATOR_KILL_AFTER", default_value_t = 1)]
    pub kill_after: u32,

    /// Maximum pods listed when no service or deployment is given
    #[arg(long, env = "OOM_TERMINATOR_PAGE_LIMIT", default_value_t = DEFAULT_PAGE_LIMIT)]
    pub page_limit: u32,

    /// Log output format
    #[arg(long, env = "OOM_TERMINATOR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Serve /healthz, /readyz and /metrics on this port
    #[arg(long, env = "OOM_TERMINATOR_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

impl TerminateArgs {
    /// Kubeconfig to load; `None` selects the in-cluster configuration
    pub fn kubeconfig_path(&self) -> Option<PathBuf> {
        if self.local {
            if let Some(home) = dirs_next::home_dir() {
                return Some(home.join(".kube").join("config"));
            }
        }
        self.config.clone()
    }

    /// Default tracing directive when RUST_LOG is unset
    pub fn log_directive(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "warn"
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.sleep)
    }

    pub fn kill_sleep(&self) -> Duration {
        Duration::from_millis(self.kill_sleep)
    }

    /// How long without a completed iteration before liveness fails
    pub fn health_stale_after(&self) -> Duration {
        (self.poll_interval() + self.kill_sleep()) * 10 + Duration::from_secs(60)
    }

    /// Loop builder carrying every setting except the cluster API
    pub fn loop_builder(&self) -> TerminatorLoopBuilder {
        TerminatorLoopBuilder::new()
            .namespace(self.namespace.clone())
            .services(self.services.clone())
            .deployments(self.deployments.clone())
            .page_limit(self.page_limit)
            .memory_limit(self.limit)
            .kill_after(self.kill_after)
            .poll_interval(self.poll_interval())
            .kill_sleep(self.kill_sleep())
            .dry_run(self.dry_run)
    }
}
