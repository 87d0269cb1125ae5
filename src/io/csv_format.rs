//! CSV formats for the replay harness
//!
//! This module centralizes all CSV format concerns:
//! - `WalletRow` for seeding the ledger
//! - `CommandRecord` rows of the command script and their conversion to
//!   [`ReplayCommand`]
//! - wallet balance output
//!
//! All functions are pure (no I/O) for easy testing.
//!
//! # Command script
//!
//! ```text
//! command,caller,label,to_bank,from_wallet,to_wallet,amount,currency,reference,description,reason,api_key
//! initiate,BCA,t1,BRI,wallet-bca-001,wallet-bri-001,50000,IDR,INV-001,Invoice,,bca-key
//! execute,BCA,t1,,,,,,,,,bca-key
//! complete,BRI,t1,,,wallet-bri-001,,,,,,bri-key
//! ```
//!
//! `label` names a transfer within the script; later rows refer to the
//! transaction created by the `initiate` row with the same label. `api_key`
//! is the caller's credential and is checked before the row is applied.

use serde::Deserialize;
use std::io::Write;

use crate::types::{Amount, ParticipantCode, TransferError, TransferRequest, Wallet, WalletId};

/// One row of the wallets file: `wallet,participant,account_number,balance,currency,active`
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct WalletRow {
    pub wallet: WalletId,
    pub participant: ParticipantCode,
    pub account_number: String,
    pub balance: Amount,
    pub currency: String,
    pub active: bool,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Wallet {
            id: row.wallet,
            owner: row.participant,
            account_number: row.account_number,
            balance: row.balance,
            currency: row.currency,
            active: row.active,
        }
    }
}

/// Raw command script row
///
/// Every column except `command` is optional at the CSV level; which ones
/// are required depends on the command.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct CommandRecord {
    pub command: String,
    pub caller: Option<String>,
    pub label: Option<String>,
    pub to_bank: Option<String>,
    pub from_wallet: Option<String>,
    pub to_wallet: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub reason: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Initiate,
    Execute,
    Complete,
    Cancel,
    Refund,
    Notify,
    Sweep,
}

/// Operation requested by one script row
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Initiate(TransferRequest),
    Execute,
    /// Settle using the token from the caller's inbox; `to_wallet` overrides
    /// the wallet named in the notification
    Complete { to_wallet: Option<WalletId> },
    Cancel { reason: Option<String> },
    Refund,
    Notify,
    Sweep,
}

/// A validated script row
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayCommand {
    /// Line in the script file, header included
    pub line: u64,
    pub caller: ParticipantCode,
    /// Credential presented by the caller
    pub api_key: Option<String>,
    pub label: String,
    pub action: Action,
}

impl ReplayCommand {
    pub fn command_type(&self) -> CommandType {
        match self.action {
            Action::Initiate(_) => CommandType::Initiate,
            Action::Execute => CommandType::Execute,
            Action::Complete { .. } => CommandType::Complete,
            Action::Cancel { .. } => CommandType::Cancel,
            Action::Refund => CommandType::Refund,
            Action::Notify => CommandType::Notify,
            Action::Sweep => CommandType::Sweep,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Convert a CommandRecord into a ReplayCommand
///
/// Command names are case-insensitive. `caller` and `label` are required for
/// every command but `sweep`; `initiate` additionally requires `to_bank`,
/// `from_wallet`, `to_wallet`, `amount` and `currency`. Amounts are integer
/// minor units.
///
/// # Arguments
///
/// * `record` - The deserialized CSV record
/// * `line` - Line number used in error messages
pub fn convert_command_record(
    record: CommandRecord,
    line: u64,
) -> Result<ReplayCommand, TransferError> {
    let parse_error = |message: String| TransferError::ParseError {
        line: Some(line),
        message,
    };

    let command_type = match record.command.trim().to_lowercase().as_str() {
        "initiate" => CommandType::Initiate,
        "execute" => CommandType::Execute,
        "complete" => CommandType::Complete,
        "cancel" => CommandType::Cancel,
        "refund" => CommandType::Refund,
        "notify" => CommandType::Notify,
        "sweep" => CommandType::Sweep,
        other => return Err(parse_error(format!("Invalid command: '{}'", other))),
    };

    let caller = non_empty(record.caller);
    let label = non_empty(record.label);
    let api_key = non_empty(record.api_key);
    if command_type == CommandType::Sweep {
        return Ok(ReplayCommand {
            line,
            caller: caller.unwrap_or_default(),
            api_key,
            label: label.unwrap_or_default(),
            action: Action::Sweep,
        });
    }

    let caller = caller.ok_or_else(|| parse_error("Missing caller".to_string()))?;
    let label = label.ok_or_else(|| parse_error("Missing label".to_string()))?;

    let action = match command_type {
        CommandType::Initiate => {
            let required = |value: Option<String>, field: &str| {
                non_empty(value).ok_or_else(|| parse_error(format!("Missing {}", field)))
            };
            let amount_str = required(record.amount, "amount")?;
            let amount = amount_str
                .parse::<Amount>()
                .map_err(|_| parse_error(format!("Invalid amount '{}'", amount_str)))?;

            Action::Initiate(TransferRequest {
                to_participant: required(record.to_bank, "to_bank")?,
                from_wallet: required(record.from_wallet, "from_wallet")?,
                to_wallet: required(record.to_wallet, "to_wallet")?,
                amount,
                currency: required(record.currency, "currency")?,
                reference: non_empty(record.reference),
                description: non_empty(record.description),
            })
        }
        CommandType::Execute => Action::Execute,
        CommandType::Complete => Action::Complete {
            to_wallet: non_empty(record.to_wallet),
        },
        CommandType::Cancel => Action::Cancel {
            reason: non_empty(record.reason),
        },
        CommandType::Refund => Action::Refund,
        CommandType::Notify => Action::Notify,
        CommandType::Sweep => Action::Sweep,
    };

    Ok(ReplayCommand {
        line,
        caller,
        api_key,
        label,
        action,
    })
}

/// Write wallet balances as CSV to the provided writer
///
/// Columns: `wallet,participant,balance,currency,active`, sorted by wallet
/// id for deterministic output.
pub fn write_wallets_csv(wallets: &[Wallet], output: &mut dyn Write) -> Result<(), TransferError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record(["wallet", "participant", "balance", "currency", "active"])?;

    let mut sorted = wallets.to_vec();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    for wallet in sorted {
        writer.write_record(&[
            wallet.id,
            wallet.owner,
            wallet.balance.to_string(),
            wallet.currency,
            wallet.active.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
