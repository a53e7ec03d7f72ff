//! External-interface ingestion.
//!
//! Boundary adapters that turn collaborator-supplied data — AIS CSV
//! batches, corridor/port definition documents, sanctions watchlists,
//! GFW event payloads — into store records. Malformed rows are counted
//! and logged, never fatal: a single bad row must not abort a batch.

mod ais_csv;
mod geodata;
mod gfw;
mod watchlist;

pub use ais_csv::*;
pub use geodata::*;
pub use gfw::*;
pub use watchlist::*;

use thiserror::Error;

/// Ingestion errors surfaced to callers. Row-level problems are counted
/// in summaries instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {0}: {1}")]
    Io(std::path::PathBuf, #[source] std::io::Error),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Split a CSV line respecting quoted fields (handles commas inside
/// quotes). Returns owned strings because quoted fields need unquoting.
pub(crate) fn csv_split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    // Check for escaped quote ("")
                    if chars.peek() == Some(&'"') {
                        current.push('"');
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => {
                fields.push(current.clone());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::csv_split;

    #[test]
    fn splits_quoted_fields() {
        let fields = csv_split(r#"a,"b, with comma","c ""quoted"" d",e"#);
        assert_eq!(fields, vec!["a", "b, with comma", r#"c "quoted" d"#, "e"]);
    }

    #[test]
    fn trailing_empty_field_is_kept() {
        assert_eq!(csv_split("a,b,"), vec!["a", "b", ""]);
    }
}
