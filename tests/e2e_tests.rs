//! End-to-end integration tests
//!
//! These tests validate the complete replay pipeline using predefined CSV
//! fixtures. Each test:
//! 1. Seeds wallets.csv and participants.csv from a fixture directory
//! 2. Replays commands.csv through the engine
//! 3. Captures the wallet balance CSV
//! 4. Compares it with expected.csv
//!
//! Test fixtures are located in tests/fixtures/ and cover:
//! - Happy path transfers between several participants
//! - Cancellation and explicit refunds
//! - Rejected requests (validation, authorization, connectivity)
//! - Settlement with a wrong destination wallet or by the wrong participant
//! - Out-of-order and repeated protocol steps
//! - Malformed script rows
//!
//! Each fixture is replayed twice: once with the sequential strategy and once
//! with the concurrent one. Labels in a fixture never compete for the same
//! funds, so both strategies must produce identical balances.

#[cfg(test)]
mod tests {
    use clap::Parser;
    use interbank_escrow::app;
    use interbank_escrow::cli::{CliArgs, StrategyType};
    use interbank_escrow::types::{StepKind, StepOutcome, TransactionStatus};
    use interbank_escrow::Transaction;
    use rstest::rstest;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn fixture_args(fixture_dir: &str, strategy: StrategyType, extra: &[&str]) -> CliArgs {
        let wallets = format!("{}/wallets.csv", fixture_dir);
        let participants = format!("{}/participants.csv", fixture_dir);
        let commands = format!("{}/commands.csv", fixture_dir);
        for path in [&wallets, &participants, &commands] {
            assert!(Path::new(path).exists(), "Fixture file not found: {}", path);
        }

        let strategy = match strategy {
            StrategyType::Sequential => "sequential",
            StrategyType::Concurrent => "concurrent",
        };
        let mut args = vec![
            "interbank-escrow",
            "--wallets",
            wallets.as_str(),
            "--participants",
            participants.as_str(),
            "--strategy",
            strategy,
        ];
        args.extend_from_slice(extra);
        args.push(commands.as_str());
        CliArgs::try_parse_from(args).unwrap()
    }

    /// Replay a fixture and compare the balance report with expected.csv
    ///
    /// # Panics
    ///
    /// Panics if fixture files are missing or the output does not match.
    async fn run_test_fixture(fixture_name: &str, strategy: StrategyType) {
        let fixture_dir = format!("tests/fixtures/{}", fixture_name);
        let expected_path = format!("{}/expected.csv", fixture_dir);
        let args = fixture_args(&fixture_dir, strategy, &["--batch-size", "3"]);

        let mut output = Vec::new();
        app::run(&args, app::load_config(&args).unwrap(), &mut output)
            .await
            .unwrap_or_else(|e| panic!("Failed to replay {}: {}", fixture_name, e));

        let actual_output = String::from_utf8(output).unwrap();
        let expected_output = fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read expected file {}: {}", expected_path, e));

        assert_eq!(
            actual_output, expected_output,
            "\n\nOutput mismatch for fixture: {} (strategy: {:?})\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, strategy, actual_output, expected_output
        );
    }

    /// End-to-end test for all fixtures with both replay strategies
    #[rstest]
    #[case("happy_path")]
    #[case("cancel_and_refund")]
    #[case("validation_failures")]
    #[case("wrong_destination")]
    #[case("protocol_violations")]
    #[case("malformed_data")]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fixtures(
        #[case] fixture: &str,
        #[values(StrategyType::Sequential, StrategyType::Concurrent)] strategy: StrategyType,
    ) {
        run_test_fixture(fixture, strategy).await;
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_transactions_dump_records_step_logs(
        #[values(StrategyType::Sequential, StrategyType::Concurrent)] strategy: StrategyType,
    ) {
        let out_dir = TempDir::new().unwrap();
        let dump = out_dir.path().join("transactions.json").display().to_string();
        let audit = out_dir.path().join("audit.csv").display().to_string();
        let args = fixture_args(
            "tests/fixtures/cancel_and_refund",
            strategy,
            &["--transactions-out", dump.as_str(), "--audit-log", audit.as_str()],
        );

        let mut output = Vec::new();
        let report = app::run(&args, app::load_config(&args).unwrap(), &mut output)
            .await
            .unwrap();

        assert_eq!(report.applied, 9);
        assert_eq!(report.rejected, 4);
        assert_eq!(report.skipped, 0);

        let transactions: Vec<Transaction> =
            serde_json::from_str(&fs::read_to_string(&dump).unwrap()).unwrap();
        assert_eq!(transactions.len(), 3);
        assert!(transactions
            .iter()
            .all(|tx| tx.status == TransactionStatus::Cancelled));
        let refunded = transactions
            .iter()
            .filter(|tx| {
                tx.steps
                    .iter()
                    .any(|s| s.kind == StepKind::Refunded && s.outcome == StepOutcome::Success)
            })
            .count();
        assert_eq!(refunded, 1);

        let audit_rows = fs::read_to_string(&audit).unwrap();
        assert!(audit_rows.lines().count() > 3, "{}", audit_rows);
        assert!(audit_rows.contains("Canceled"));
    }
}
