pub mod code;

pub use code::*;

use html_escape::decode_html_entities;

/// UTF-8 text that was decoded as Latin-1 somewhere upstream.
const MOJIBAKE: [(&str, &str); 12] = [
    ("Ã§", "ç"),
    ("Ã£", "ã"),
    ("Ã©", "é"),
    ("Ã¡", "á"),
    ("Ãª", "ê"),
    ("Ã³", "ó"),
    ("Ãµ", "õ"),
    ("Ãº", "ú"),
    ("Ã¢", "â"),
    ("Ã´", "ô"),
    ("Ã\u{ad}", "í"),
    ("Ã\u{a0}", "à"),
];

/// Clean and normalize text by removing extra whitespace and decoding HTML entities
pub fn clean_text(text: &str) -> String {
    let decoded = decode_html_entities(text);
    decoded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

pub fn repair_mojibake(text: &str) -> String {
    if !text.contains('Ã') {
        return text.to_string();
    }
    MOJIBAKE
        .iter()
        .fold(text.to_string(), |acc, (broken, fixed)| acc.replace(broken, fixed))
}
