//! I/O module
//!
//! Handles CSV parsing and output.
//!
//! # Components
//!
//! - `csv_format` - CSV formats (seed rows, command script rows, wallet output)
//! - `sync_reader` - Synchronous CSV readers with iterator interface
//! - `async_reader` - Asynchronous CSV reader with batch reading interface

pub mod async_reader;
pub mod csv_format;
pub mod sync_reader;

pub use async_reader::AsyncReader;
pub use csv_format::{
    convert_command_record, write_wallets_csv, Action, CommandRecord, CommandType, ReplayCommand,
    WalletRow,
};
pub use sync_reader::{read_participants, read_wallets, SyncReader};
