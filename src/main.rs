//! Interbank escrow replay CLI
//!
//! Seeds the wallet ledger and participant directory from CSV files, replays
//! a command script through the escrow engine and prints final wallet
//! balances to stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --wallets wallets.csv --participants participants.csv commands.csv > balances.csv
//! cargo run -- --wallets w.csv --participants p.csv --strategy sequential commands.csv
//! cargo run -- --wallets w.csv --participants p.csv --config escrow.toml \
//!     --audit-log audit.csv --transactions-out transactions.json commands.csv
//! ```
//!
//! # Replay Strategies
//!
//! - **sequential**: commands applied one at a time in file order
//! - **concurrent**: commands grouped by label and replayed in parallel tasks (default)
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (bad configuration, missing or unreadable input file, etc.)

use interbank_escrow::{app, cli, logging};
use std::process;

#[tokio::main]
async fn main() {
    let args = cli::parse_args();

    let config = match app::load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    logging::init_logging(&config.logging);

    let mut output = std::io::stdout();
    if let Err(e) = app::run(&args, config, &mut output).await {
        tracing::error!(code = e.code(), error = %e, "replay failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
