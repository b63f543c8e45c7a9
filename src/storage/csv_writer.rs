use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::ResultSink;
use crate::config::{OutputLayout, OutputSettings};
use crate::error::OutputError;
use crate::models::ResultRecord;

/// Spreadsheet applications need the BOM to pick UTF-8 over the locale codepage.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

const BASIC_HEADER: [&str; 3] = ["CÓDIGO", "PRODUTO", "ENCONTRADO"];
const SHOPPING_HEADER: [&str; 7] = ["PRODUTO", "TÍTULO", "PREÇO", "LOJA", "LINK", "IMAGEM", "STATUS"];
const NOT_AVAILABLE: &str = "N/A";

/// Semicolon-delimited snapshot writer. Commas show up in pt-BR prices and titles.
pub struct CsvResultWriter {
    path: PathBuf,
    layout: OutputLayout,
    not_found_text: String,
}

impl CsvResultWriter {
    pub fn new(path: impl Into<PathBuf>, settings: &OutputSettings) -> Self {
        Self {
            path: path.into(),
            layout: settings.layout,
            not_found_text: settings.not_found_text.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn header(&self) -> &'static [&'static str] {
        match self.layout {
            OutputLayout::Basic => &BASIC_HEADER,
            OutputLayout::Shopping => &SHOPPING_HEADER,
        }
    }

    fn row<'a>(&'a self, record: &'a ResultRecord) -> Vec<&'a str> {
        let text = record.found_text.as_deref().unwrap_or(self.not_found_text.as_str());
        match self.layout {
            OutputLayout::Basic => vec![
                record.query.as_str(),
                text,
                if record.found { "SIM" } else { "NÃO" },
            ],
            OutputLayout::Shopping => {
                let details = &record.details;
                vec![
                    record.query.as_str(),
                    text,
                    details.price.as_deref().unwrap_or(NOT_AVAILABLE),
                    details.store.as_deref().unwrap_or(NOT_AVAILABLE),
                    details.link.as_deref().unwrap_or(NOT_AVAILABLE),
                    details.image.as_deref().unwrap_or(""),
                    if record.found { "ENCONTRADO" } else { "NÃO ENCONTRADO" },
                ]
            }
        }
    }

    /// The full file content for `records`.
    pub fn render(&self, records: &[ResultRecord]) -> Result<Vec<u8>, OutputError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .terminator(csv::Terminator::CRLF)
            .from_writer(UTF8_BOM.to_vec());

        writer.write_record(self.header())?;
        for record in records {
            writer.write_record(self.row(record))?;
        }

        writer.into_inner().map_err(|e| OutputError::Io {
            path: self.path.clone(),
            source: e.into_error(),
        })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl ResultSink for CsvResultWriter {
    fn write_snapshot(&self, records: &[ResultRecord]) -> Result<(), OutputError> {
        let bytes = self.render(records)?;
        let io_err = |source| OutputError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        // Write beside the target and swap, so a crash never leaves half a file.
        let temp = self.temp_path();
        fs::write(&temp, &bytes).map_err(io_err)?;
        fs::rename(&temp, &self.path).map_err(io_err)?;

        debug!("Wrote {} records to {}", records.len(), self.path.display());
        Ok(())
    }
}
