use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};

use screener_core::normalize_symbol;

/// Load the universe/watchlist CSV: a headered file with at least a
/// `symbol` column. Symbols are uppercased and deduplicated, first
/// occurrence wins, input order preserved.
pub fn load_universe(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open universe file {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header row of {}", path.display()))?;
    let symbol_idx = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("symbol"));
    let Some(symbol_idx) = symbol_idx else {
        bail!("universe file {} has no 'symbol' column", path.display());
    };

    let mut seen = HashSet::new();
    let mut symbols = Vec::new();
    for record in reader.records() {
        let record =
            record.with_context(|| format!("malformed row in {}", path.display()))?;
        let Some(raw) = record.get(symbol_idx) else {
            continue;
        };
        let symbol = normalize_symbol(raw);
        if symbol.is_empty() {
            continue;
        }
        if seen.insert(symbol.clone()) {
            symbols.push(symbol);
        }
    }
    Ok(symbols)
}
