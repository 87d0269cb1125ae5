//! Asynchronous CSV reader with batch interface
//!
//! Streams the command script with csv-async and hands it out in batches.
//! Rows that fail to parse are logged and skipped; the count of skipped rows
//! is kept so the replay report can include it.
//!
//! # Architecture
//!
//! ```text
//! tokio File → compat → AsyncReader → Batches of ReplayCommands
//!                           ↓
//!                   csv_format module
//!          (CommandRecord, convert_command_record)
//! ```

use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

use crate::io::csv_format::{convert_command_record, CommandRecord, ReplayCommand};
use crate::types::TransferError;

pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
    line_num: u64,
    skipped: usize,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self {
            csv_reader,
            line_num: 1,
            skipped: 0,
        }
    }

    /// Read up to `batch_size` valid commands
    ///
    /// An empty batch means the end of the script.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<ReplayCommand> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<CommandRecord>();

        while batch.len() < batch_size {
            let Some(next) = records.next().await else {
                break;
            };
            self.line_num += 1;

            let converted = match next {
                Ok(record) => convert_command_record(record, self.line_num),
                Err(e) => Err(TransferError::ParseError {
                    line: Some(self.line_num),
                    message: e.to_string(),
                }),
            };
            match converted {
                Ok(command) => batch.push(command),
                Err(e) => {
                    warn!(error = %e, "skipping command row");
                    self.skipped += 1;
                }
            }
        }

        batch
    }

    /// Rows skipped so far because they could not be parsed
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}
