use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static DATA_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:(?P<mime>[\w/+.-]*)?(?:;[\w=-]+)*;base64,(?P<payload>.*)$")
        .expect("Invalid data URI regex")
});

static NAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Directory of downloaded product images with generated names.
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    /// Writes `bytes` under a fresh name and returns the file name.
    pub fn save(&self, query: &str, bytes: &[u8]) -> io::Result<String> {
        self.ensure_dir()?;
        let mut name = unique_name(query);
        while self.dir.join(&name).exists() {
            name = unique_name(query);
        }
        fs::write(self.dir.join(&name), bytes)?;
        Ok(name)
    }
}

/// Eight hex characters plus `.jpg`, unique within the process.
pub fn unique_name(query: &str) -> String {
    let mut context = md5::Context::new();
    context.consume(query.as_bytes());
    context.consume(
        chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_le_bytes(),
    );
    context.consume(NAME_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    context.consume(fastrand::u64(..).to_le_bytes());
    let digest = format!("{:x}", context.compute());
    format!("{}.jpg", &digest[..8])
}

/// Decodes an inline `data:...;base64,` image. `None` for anything else.
pub fn decode_data_uri(src: &str) -> Option<Vec<u8>> {
    let captures = DATA_URI.captures(src.trim())?;
    STANDARD.decode(captures.name("payload")?.as_str()).ok()
}
