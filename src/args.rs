use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::config::{DEFAULT_BATCH_SIZE, SyncConfig};
use crate::table::DEFAULT_SCHEMA;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replace the target database contents with a full copy of the source
    Sync {
        /// Source PostgreSQL connection URI
        #[arg(short, long, env = "SYNC_SOURCE_URL")]
        source: String,

        /// Target PostgreSQL connection URI (all its rows are replaced)
        #[arg(short, long, env = "SYNC_TARGET_URL")]
        target: String,

        #[command(flatten)]
        options: SyncOptions,

        /// Environment the target belongs to; production targets are refused
        #[arg(long, env = "SYNC_TARGET_ENV")]
        target_env: Option<String>,

        /// Rows per INSERT statement
        #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Per-statement timeout in seconds (0 disables it)
        #[arg(long, default_value_t = 0)]
        statement_timeout_secs: u64,

        /// Only introspect and print the plan; nothing is modified
        #[arg(long, default_value = "false")]
        dry_run: bool,

        /// Also write the run report as JSON to this file
        #[arg(long)]
        report_json: Option<PathBuf>,
    },
    /// Print the copy order resolved from the target schema
    Plan {
        /// Source PostgreSQL connection URI
        #[arg(short, long, env = "SYNC_SOURCE_URL")]
        source: String,

        /// Target PostgreSQL connection URI
        #[arg(short, long, env = "SYNC_TARGET_URL")]
        target: String,

        #[command(flatten)]
        options: SyncOptions,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SyncOptions {
    /// Schema to sync
    #[arg(long, default_value = DEFAULT_SCHEMA)]
    pub schema: String,

    /// Table to leave untouched (repeatable)
    #[arg(long = "exclude", value_name = "TABLE")]
    pub exclude: Vec<String>,

    /// Seconds to wait for a pooled connection
    #[arg(long, default_value_t = 30)]
    pub connect_timeout_secs: u64,
}

impl SyncOptions {
    fn apply(&self, config: &mut SyncConfig) {
        config.schema = self.schema.clone();
        config.exclude = self.exclude.clone();
        config.connect_timeout = Duration::from_secs(self.connect_timeout_secs);
    }
}

impl Command {
    /// Builds the run configuration for this command.
    pub fn to_config(&self) -> SyncConfig {
        match self {
            Command::Sync {
                source,
                target,
                options,
                target_env,
                batch_size,
                statement_timeout_secs,
                dry_run,
                report_json: _,
            } => {
                let mut config = SyncConfig::new(source, target);
                options.apply(&mut config);
                config.target_env = target_env.clone();
                config.batch_size = *batch_size;
                config.statement_timeout =
                    (*statement_timeout_secs > 0).then(|| Duration::from_secs(*statement_timeout_secs));
                config.dry_run = *dry_run;
                config
            }
            Command::Plan {
                source,
                target,
                options,
            } => {
                let mut config = SyncConfig::new(source, target);
                options.apply(&mut config);
                config.dry_run = true;
                config
            }
        }
    }
}

pub fn get_args() -> Result<Args, clap::Error> {
    Args::try_parse()
}
