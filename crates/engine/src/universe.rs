//! Symbol universe loading
//!
//! The ticker list lives in an external file, one symbol per line;
//! `#` starts a comment. Nothing in the engine hardcodes symbols.

use anyhow::{Context, Result};
use std::path::Path;

/// Parse a symbols file body: trims, drops blanks and comments, dedupes
/// while preserving order.
pub fn parse_symbols(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    text.lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_uppercase())
        .filter(|sym| seen.insert(sym.clone()))
        .collect()
}

pub fn load_symbols(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading symbols file {}", path.display()))?;
    Ok(parse_symbols(&text))
}

/// Append an exchange convention suffix (e.g. `.P` for perpetuals) to
/// symbols that do not already carry it
pub fn apply_suffix(symbols: Vec<String>, suffix: &str) -> Vec<String> {
    if suffix.is_empty() {
        return symbols;
    }
    symbols
        .into_iter()
        .map(|s| {
            if s.ends_with(suffix) {
                s
            } else {
                format!("{s}{suffix}")
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_dedupes() {
        let text = "BTCUSDT\n# majors\nethusdt\n\nBTCUSDT  # again\nSOLUSDT\n";
        assert_eq!(parse_symbols(text), vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
    }

    #[test]
    fn comment_only_lines_are_skipped() {
        assert!(parse_symbols("# nothing here\n   \n").is_empty());
    }

    #[test]
    fn suffix_is_idempotent() {
        let symbols = vec!["BTCUSDT".to_string(), "ETHUSDT.P".to_string()];
        assert_eq!(
            apply_suffix(symbols, ".P"),
            vec!["BTCUSDT.P", "ETHUSDT.P"]
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_symbols("/definitely/not/here.txt").is_err());
    }
}
