//! Synchronous CSV readers
//!
//! [`SyncReader`] streams the command script one row at a time through an
//! iterator. `read_wallets` and `read_participants` load the small seed
//! files in one go.

use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::path::Path;

use crate::directory::Participant;
use crate::io::csv_format::{convert_command_record, CommandRecord, ReplayCommand, WalletRow};
use crate::types::{TransferError, Wallet};

fn open(path: &Path) -> Result<csv::Reader<File>, TransferError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => TransferError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => TransferError::IoError {
            message: format!("Failed to open file '{}': {}", path.display(), e),
        },
    })?;

    Ok(ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .buffer_capacity(8 * 1024)
        .from_reader(file))
}

/// Streaming reader over the command script
#[derive(Debug)]
pub struct SyncReader {
    reader: csv::Reader<File>,
    line_num: u64,
}

impl SyncReader {
    pub fn new(path: &Path) -> Result<Self, TransferError> {
        Ok(Self {
            reader: open(path)?,
            line_num: 1,
        })
    }
}

impl Iterator for SyncReader {
    type Item = Result<ReplayCommand, TransferError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<CommandRecord>();
        let next = deserializer.next()?;
        self.line_num += 1;

        Some(match next {
            Ok(record) => convert_command_record(record, self.line_num),
            Err(e) => Err(TransferError::ParseError {
                line: Some(self.line_num),
                message: e.to_string(),
            }),
        })
    }
}

/// Read every row of a seed file; the first malformed row aborts the load
fn read_all<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, TransferError> {
    let mut reader = open(path)?;
    let mut rows = Vec::new();
    for (index, row) in reader.deserialize::<T>().enumerate() {
        let row = row.map_err(|e| TransferError::ParseError {
            line: Some(index as u64 + 2),
            message: e.to_string(),
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Load wallets: `wallet,participant,account_number,balance,currency,active`
pub fn read_wallets(path: &Path) -> Result<Vec<Wallet>, TransferError> {
    Ok(read_all::<WalletRow>(path)?
        .into_iter()
        .map(Wallet::from)
        .collect())
}

/// Load participants: `code,name,api_key,active`
pub fn read_participants(path: &Path) -> Result<Vec<Participant>, TransferError> {
    read_all(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::csv_format::{Action, CommandType};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str =
        "command,caller,label,to_bank,from_wallet,to_wallet,amount,currency,reference,description,reason,api_key\n";

    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[test]
    fn test_sync_reader_fails_on_missing_file() {
        let result = SyncReader::new(Path::new("nonexistent.csv"));
        assert!(matches!(result, Err(TransferError::FileNotFound { .. })));
    }

    #[test]
    fn test_sync_reader_iterates_script() {
        let content = format!(
            "{}initiate,BCA,t1,BRI,wallet-bca-001,wallet-bri-001,50000,IDR,INV-001,,\n\
             execute,BCA,t1,,,,,,,,\n\
             complete,BRI,t1,,,wallet-bri-001,,,,,\n",
            HEADER
        );
        let file = create_temp_csv(&content);

        let commands: Vec<_> = SyncReader::new(file.path())
            .unwrap()
            .map(|c| c.unwrap())
            .collect();

        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].command_type(), CommandType::Initiate);
        assert_eq!(commands[0].line, 2);
        assert_eq!(commands[1].action, Action::Execute);
        assert_eq!(commands[2].caller, "BRI");
        assert_eq!(commands[2].line, 4);
    }

    #[test]
    fn test_sync_reader_tolerates_short_rows() {
        let content = format!("{}execute,BCA,t1\nsweep\n", HEADER);
        let file = create_temp_csv(&content);

        let commands: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].as_ref().unwrap().action, Action::Execute);
        assert_eq!(commands[1].as_ref().unwrap().action, Action::Sweep);
    }

    #[test]
    fn test_sync_reader_includes_line_numbers_in_errors() {
        let content = format!(
            "{}execute,BCA,t1,,,,,,,,\n\
             initiate,BCA,t2,BRI,wallet-bca-001,wallet-bri-001,lots,IDR,,,\n\
             bogus,BCA,t3,,,,,,,,\n\
             cancel,BCA,t1,,,,,,,,changed mind\n",
            HEADER
        );
        let file = create_temp_csv(&content);

        let results: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        let amount_error = results[1].as_ref().unwrap_err().to_string();
        assert!(amount_error.contains("line 3"), "{}", amount_error);
        let command_error = results[2].as_ref().unwrap_err().to_string();
        assert!(command_error.contains("line 4"), "{}", command_error);
        assert!(results[3].is_ok());
    }

    #[test]
    fn test_read_wallets() {
        let file = create_temp_csv(
            "wallet,participant,account_number,balance,currency,active\n\
             wallet-bca-001, BCA ,1234567890,1000000,IDR,true\n\
             wallet-bri-001,BRI,5555555555,750000,IDR,false\n",
        );

        let wallets = read_wallets(file.path()).unwrap();

        assert_eq!(wallets.len(), 2);
        assert_eq!(wallets[0].owner, "BCA");
        assert_eq!(wallets[0].balance, 1_000_000);
        assert!(!wallets[1].active);
    }

    #[test]
    fn test_read_wallets_rejects_negative_balance() {
        let file = create_temp_csv(
            "wallet,participant,account_number,balance,currency,active\n\
             wallet-bca-001,BCA,1234567890,-5,IDR,true\n",
        );

        let error = read_wallets(file.path()).unwrap_err();

        assert!(matches!(
            error,
            TransferError::ParseError { line: Some(2), .. }
        ));
    }

    #[test]
    fn test_read_participants() {
        let file = create_temp_csv(
            "code,name,api_key,active\n\
             BCA,Bank Central Asia,bca-secret,true\n\
             BRI,Bank Rakyat Indonesia,bri-secret,false\n",
        );

        let participants = read_participants(file.path()).unwrap();

        assert_eq!(participants.len(), 2);
        assert_eq!(participants[0].code, "BCA");
        assert_eq!(participants[0].api_key, "bca-secret");
        assert!(!participants[1].active);
    }
}
