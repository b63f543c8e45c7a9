use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::info;

use crate::error::InputError;

/// Reads one query per non-blank line, trimmed, in file order.
pub fn load_codes(path: &Path) -> Result<Vec<String>, InputError> {
    let content = fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => InputError::Missing(path.to_path_buf()),
        _ => InputError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let codes: Vec<String> = content
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    info!("Loaded {} codes from {}", codes.len(), path.display());
    Ok(codes)
}
