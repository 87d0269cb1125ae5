//! Replay strategy module
//!
//! This module defines the Strategy pattern for replaying a command script
//! through the engine, encompassing both CSV parsing and command dispatch.
//! This allows different replay implementations (sequential, concurrent) to
//! be selected at runtime.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::cli::StrategyType;
use crate::types::TransferError;

pub mod concurrent;
pub mod harness;
pub mod sequential;

pub use concurrent::{BatchConfig, ConcurrentStrategy};
pub use harness::{ReplayHarness, ReplayReport};
pub use sequential::SequentialStrategy;

/// Replay pipeline: read a command script and apply it through a harness
#[async_trait]
pub trait ReplayStrategy: Send + Sync {
    /// Replay every command in `script`
    ///
    /// # Returns
    ///
    /// * `Ok(ReplayReport)` - once every command has been applied or rejected
    /// * `Err(TransferError)` - the script could not be opened or read
    ///
    /// Individual command rejections are counted in the report, not returned.
    async fn replay(
        &self,
        script: &Path,
        harness: Arc<ReplayHarness>,
    ) -> Result<ReplayReport, TransferError>;
}

/// Factory function to create a replay strategy
///
/// # Arguments
///
/// * `strategy_type` - The type of strategy to create
/// * `config` - Batch settings for the concurrent strategy (ignored by sequential)
pub fn create_strategy(
    strategy_type: StrategyType,
    config: Option<BatchConfig>,
) -> Box<dyn ReplayStrategy> {
    match strategy_type {
        StrategyType::Sequential => Box::new(SequentialStrategy),
        StrategyType::Concurrent => Box::new(ConcurrentStrategy::new(config.unwrap_or_default())),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::ReplayHarness;
    use crate::config::EngineConfig;
    use crate::core::{InMemoryWalletLedger, TransactionEngine};
    use crate::directory::{Participant, ParticipantRegistry};
    use crate::types::Wallet;
    use std::sync::Arc;

    pub const HEADER: &str =
        "command,caller,label,to_bank,from_wallet,to_wallet,amount,currency,reference,description,reason,api_key\n";

    pub fn harness() -> ReplayHarness {
        let ledger = Arc::new(InMemoryWalletLedger::with_wallets([
            Wallet::new("wallet-bca-001", "BCA", "1234567890", 1_000_000, "IDR"),
            Wallet::new("wallet-bri-001", "BRI", "5555555555", 750_000, "IDR"),
            Wallet::new("wallet-mandiri-001", "MANDIRI", "7777777777", 2_000_000, "IDR"),
        ]));
        let registry = Arc::new(ParticipantRegistry::with_participants(
            ["BCA", "BRI", "MANDIRI"].map(|code| Participant {
                code: code.to_string(),
                name: code.to_string(),
                api_key: format!("{}-key", code.to_lowercase()),
                active: true,
            }),
        ));
        let engine = TransactionEngine::in_memory(ledger, registry.clone(), EngineConfig::default());
        ReplayHarness::new(engine, registry)
    }
}
