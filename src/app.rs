//! Replay application
//!
//! Wires the engine to its collaborators from CLI arguments, runs the
//! selected replay strategy and writes the reports.
//!
//! ```text
//! wallets.csv ──────► InMemoryWalletLedger ─┐
//! participants.csv ─► ParticipantRegistry ──┼─► TransactionEngine ─► ReplayHarness
//! --audit-log ──────► CsvAuditSink/outbox ──┘                           │
//! commands.csv ─────────────────────────────────► ReplayStrategy ───────┘
//!                                                       │
//!                     stdout ◄── wallet balances ◄──────┘
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::{AuditOutbox, CsvAuditSink};
use crate::cli::CliArgs;
use crate::config::EngineConfig;
use crate::core::{InMemoryWalletLedger, TransactionEngine};
use crate::directory::ParticipantRegistry;
use crate::io::{read_participants, read_wallets, write_wallets_csv};
use crate::strategy::{create_strategy, ReplayHarness, ReplayReport};
use crate::types::TransferError;

/// Load the configuration file (if any) and apply CLI overrides
pub fn load_config(args: &CliArgs) -> Result<EngineConfig, TransferError> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    args.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Run a full replay and write final wallet balances to `output`
///
/// Must be called from within a tokio runtime.
pub async fn run(
    args: &CliArgs,
    config: EngineConfig,
    output: &mut dyn Write,
) -> Result<ReplayReport, TransferError> {
    let wallets = read_wallets(&args.wallets)?;
    let participants = read_participants(&args.participants)?;
    info!(
        wallets = wallets.len(),
        participants = participants.len(),
        "seed data loaded"
    );

    let ledger = Arc::new(InMemoryWalletLedger::with_wallets(wallets));
    let registry = Arc::new(ParticipantRegistry::with_participants(participants));
    let connected = registry.connected();
    if connected.is_empty() {
        warn!("no participant is connected");
    } else {
        info!(connected = ?connected, "participant network online");
    }
    let audit = match &args.audit_log {
        Some(path) => AuditOutbox::spawn(
            Arc::new(CsvAuditSink::new(path.clone())),
            config.delivery_policy(),
        ),
        None => AuditOutbox::disabled(),
    };

    let engine =
        TransactionEngine::in_memory(ledger, registry.clone(), config).with_audit(audit.clone());
    let harness = Arc::new(ReplayHarness::new(engine, registry));

    let strategy = create_strategy(args.strategy, Some(args.to_batch_config()));
    let report = strategy.replay(&args.commands, Arc::clone(&harness)).await?;

    let engine = harness.engine();
    engine.flush_audit().await;
    if let Some(stats) = audit.stats() {
        info!(
            delivered = stats.delivered(),
            retries = stats.retries(),
            dropped = stats.dropped(),
            "audit mirror flushed"
        );
    }

    write_wallets_csv(&engine.wallets(), output)?;

    if let Some(path) = &args.transactions_out {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &engine.transactions())
            .map_err(|e| TransferError::IoError {
                message: format!("Failed to write transactions: {}", e),
            })?;
        writer.flush()?;
    }

    info!(
        applied = report.applied,
        rejected = report.rejected,
        skipped = report.skipped,
        "replay finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditSink, AuditStatus};
    use crate::cli::StrategyType;
    use crate::types::{Transaction, TransactionStatus};
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    struct Workspace {
        dir: TempDir,
    }

    impl Workspace {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            fs::write(
                dir.path().join("wallets.csv"),
                "wallet,participant,account_number,balance,currency,active\n\
                 wallet-bca-001,BCA,1234567890,1000000,IDR,true\n\
                 wallet-bri-001,BRI,5555555555,750000,IDR,true\n",
            )
            .unwrap();
            fs::write(
                dir.path().join("participants.csv"),
                "code,name,api_key,active\n\
                 BCA,Bank Central Asia,bca-key,true\n\
                 BRI,Bank Rakyat Indonesia,bri-key,true\n",
            )
            .unwrap();
            fs::write(
                dir.path().join("commands.csv"),
                "command,caller,label,to_bank,from_wallet,to_wallet,amount,currency,reference,description,reason,api_key\n\
                 initiate,BCA,t1,BRI,wallet-bca-001,wallet-bri-001,50000,IDR,INV-001,Invoice,,bca-key\n\
                 execute,BCA,t1,,,,,,,,,bca-key\n\
                 complete,BRI,t1,,,,,,,,,bri-key\n",
            )
            .unwrap();
            Self { dir }
        }

        fn path(&self, name: &str) -> String {
            self.dir.path().join(name).display().to_string()
        }

        fn args(&self, extra: &[&str]) -> CliArgs {
            let wallets = self.path("wallets.csv");
            let participants = self.path("participants.csv");
            let commands = self.path("commands.csv");
            let mut args = vec![
                "interbank-escrow",
                "--wallets",
                wallets.as_str(),
                "--participants",
                participants.as_str(),
            ];
            args.extend_from_slice(extra);
            args.push(commands.as_str());
            CliArgs::try_parse_from(args).unwrap()
        }
    }

    #[tokio::test]
    async fn test_run_writes_balances_and_reports() {
        let ws = Workspace::new();
        let audit_log = ws.path("audit.csv");
        let transactions_out = ws.path("transactions.json");
        let args = ws.args(&[
            "--strategy",
            "sequential",
            "--audit-log",
            audit_log.as_str(),
            "--transactions-out",
            transactions_out.as_str(),
        ]);
        assert_eq!(args.strategy, StrategyType::Sequential);
        let mut output = Vec::new();

        let report = run(&args, load_config(&args).unwrap(), &mut output)
            .await
            .unwrap();

        assert_eq!(report.applied, 3);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "wallet,participant,balance,currency,active\n\
             wallet-bca-001,BCA,950000,IDR,true\n\
             wallet-bri-001,BRI,800000,IDR,true\n"
        );

        let transactions: Vec<Transaction> =
            serde_json::from_str(&fs::read_to_string(&transactions_out).unwrap()).unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].status, TransactionStatus::Completed);
        assert_eq!(transactions[0].steps.len(), 5);

        let history = CsvAuditSink::new(&audit_log)
            .query_by_participant("BRI")
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, AuditStatus::Done);
    }

    #[tokio::test]
    async fn test_run_missing_seed_file() {
        let ws = Workspace::new();
        fs::remove_file(ws.dir.path().join("wallets.csv")).unwrap();
        let args = ws.args(&[]);
        let mut output = Vec::new();

        let result = run(&args, EngineConfig::default(), &mut output).await;

        assert!(matches!(result, Err(TransferError::FileNotFound { .. })));
        assert!(output.is_empty());
    }

    #[test]
    fn test_load_config_applies_overrides_and_validates() {
        let ws = Workspace::new();
        let config_path = ws.path("escrow.toml");
        fs::write(&config_path, "escrow_ttl_secs = 120\nsupported_currencies = [\"IDR\", \"SGD\"]\n")
            .unwrap();

        let args = ws.args(&["--config", config_path.as_str(), "--escrow-ttl-secs", "90"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.escrow_ttl_secs, 90);
        assert!(config.is_supported_currency("SGD"));

        let zero = ws.args(&["--escrow-ttl-secs", "0"]);
        assert_eq!(load_config(&zero).unwrap_err().code(), "CONFIG_ERROR");
    }
}
