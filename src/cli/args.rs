use crate::config::EngineConfig;
use crate::strategy::BatchConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Command-line arguments for the replay binary
///
/// # Examples
///
/// ```bash
/// interbank-escrow --wallets wallets.csv --participants participants.csv commands.csv
/// interbank-escrow --wallets w.csv --participants p.csv --strategy sequential commands.csv
/// interbank-escrow --wallets w.csv --participants p.csv --config escrow.toml \
///     --audit-log audit.csv --transactions-out transactions.json commands.csv
/// ```
#[derive(Parser, Debug)]
#[command(name = "interbank-escrow")]
#[command(about = "Replay interbank escrow transfers and report wallet balances", long_about = None)]
pub struct CliArgs {
    #[arg(value_name = "COMMANDS", help = "Path to the command script CSV")]
    pub commands: PathBuf,

    #[arg(long, value_name = "FILE", help = "Wallets CSV used to seed the ledger")]
    pub wallets: PathBuf,

    #[arg(long, value_name = "FILE", help = "Participants CSV used to seed the directory")]
    pub participants: PathBuf,

    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "concurrent",
        help = "Replay strategy: 'sequential' or 'concurrent'"
    )]
    pub strategy: StrategyType,

    #[arg(long, value_name = "FILE", help = "TOML engine configuration")]
    pub config: Option<PathBuf>,

    #[arg(long = "audit-log", value_name = "FILE", help = "Append audit records to this CSV file")]
    pub audit_log: Option<PathBuf>,

    #[arg(
        long = "transactions-out",
        value_name = "FILE",
        help = "Write every transaction with its step log as JSON"
    )]
    pub transactions_out: Option<PathBuf>,

    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Commands per batch for the concurrent strategy (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Maximum label tasks running at once (default: CPU cores)"
    )]
    pub max_concurrent: Option<usize>,

    #[arg(long = "escrow-ttl-secs", value_name = "SECS", help = "Override escrow lifetime")]
    pub escrow_ttl_secs: Option<u64>,

    #[arg(long = "log-level", value_name = "LEVEL", help = "Override log level")]
    pub log_level: Option<String>,

    #[arg(long = "json-logs", help = "Emit logs as JSON")]
    pub json_logs: bool,
}

/// Replay strategy selection
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sequential,
    Concurrent,
}

impl CliArgs {
    /// Convert CLI arguments to a BatchConfig
    pub fn to_batch_config(&self) -> BatchConfig {
        let default = BatchConfig::default();
        BatchConfig::new(
            self.batch_size.unwrap_or(default.batch_size),
            self.max_concurrent.unwrap_or(default.max_concurrent),
        )
    }

    /// Apply flag overrides on top of a loaded configuration
    pub fn apply_overrides(&self, config: &mut EngineConfig) {
        if let Some(ttl) = self.escrow_ttl_secs {
            config.escrow_ttl_secs = ttl;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }
    }
}
