use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use logger::LogFormat;
use reachability::{CheckKind, RunConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Reachability and interference prober")]
pub struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/prober/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output format (compact or json)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Probe every endpoint in a catalog file
    Run(RunArgs),

    /// Multi-sample ping of one host: loss, average RTT and hop estimate
    Ping {
        host: String,

        #[arg(short = 'n', long, default_value_t = 5)]
        samples: u32,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// JSON endpoint catalog
    #[arg(short, long)]
    pub endpoints: PathBuf,

    /// Result table from a previous pass; merged into and rewritten
    #[arg(short, long)]
    pub prior: Option<PathBuf>,

    /// Where to write the merged result table (defaults to --prior)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Stop probing a target after its first successful check
    #[arg(long)]
    pub fast: bool,

    /// Probe fallback addresses even when the primary target answers
    #[arg(long)]
    pub always_fallbacks: bool,

    /// Targets probed at the same time
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Comma separated check kinds, e.g. ping,overlay-rtt,port-443
    #[arg(long, value_delimiter = ',')]
    pub checks: Option<Vec<CheckKind>>,

    /// Run the interference probe suite against each primary target
    #[arg(long)]
    pub censorship: bool,

    /// Print the run summary as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Command line flags layered over the config file
    pub fn apply(&self, mut config: RunConfig) -> RunConfig {
        if let Some(checks) = &self.checks {
            config = config.with_checks(checks.iter().copied());
        }
        if let Some(concurrency) = self.concurrency {
            config = config.with_concurrency(concurrency);
        }
        if self.fast {
            config = config.fast(true);
        }
        if self.always_fallbacks {
            config = config.always_check_fallbacks(true);
        }
        if self.censorship {
            config = config.with_censorship(true);
        }
        config
    }

    /// Output path for the merged table
    pub fn output_path(&self) -> Option<&PathBuf> {
        self.output.as_ref().or(self.prior.as_ref())
    }
}
