pub mod record;
pub mod site;

pub use record::*;
pub use site::*;

// Status prefixes for operator-facing log lines
pub const EMOJI_ROCKET: &str = "🚀";
pub const EMOJI_SEARCH: &str = "🔍";
pub const EMOJI_BATCH: &str = "📦";
pub const EMOJI_WAIT: &str = "⏳";
pub const EMOJI_CHECK: &str = "✅";
pub const EMOJI_CROSS: &str = "❌";
pub const EMOJI_WARNING: &str = "⚠️";
pub const EMOJI_PAUSE: &str = "⏸";
pub const EMOJI_STOP: &str = "🛑";
pub const EMOJI_FILE: &str = "📄";
pub const EMOJI_SUMMARY: &str = "📊";
pub const EMOJI_FOLDER: &str = "📁";
