use crate::error::OutputError;
use crate::models::ResultRecord;

mod csv_writer;
mod images;
mod input;

pub use csv_writer::CsvResultWriter;
pub use images::{decode_data_uri, ImageStore};
pub use input::load_codes;

/// Destination for result snapshots. Every call replaces what was written before.
pub trait ResultSink: Send + Sync {
    fn write_snapshot(&self, records: &[ResultRecord]) -> Result<(), OutputError>;
}
