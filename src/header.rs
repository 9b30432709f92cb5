use crate::pipeline::RowDecoder;
use crate::source::Source;
use crate::{CsvError, CsvResult};

/// Resolves the header labels for a source.
#[derive(Debug, Clone)]
pub struct HeaderResolver {
    source: Source,
    delimiter: u8,
    header_row: usize,
    explicit: Vec<String>,
}

impl HeaderResolver {
    pub fn new(source: Source, delimiter: u8, header_row: usize) -> Self {
        Self {
            source,
            delimiter,
            header_row: header_row.max(1),
            explicit: Vec::new(),
        }
    }

    /// Labels returned verbatim instead of reading the source.
    pub fn with_explicit(mut self, headers: Vec<String>) -> Self {
        self.explicit = headers;
        self
    }

    /// Returns the explicit header, or reads row `header_row` from a fresh cursor.
    ///
    /// Every call opens its own read of the source. An empty header means the source
    /// ended exactly at the header row.
    pub async fn resolve(&self) -> CsvResult<Vec<String>> {
        if !self.explicit.is_empty() {
            return Ok(self.explicit.clone());
        }

        let mut decoder = RowDecoder::new(self.source.open().await?, self.delimiter);
        for _ in 1..self.header_row {
            if decoder.next_fields().await?.is_none() {
                return Err(CsvError::HeaderRowNotFound {
                    row: self.header_row,
                });
            }
        }
        let header = decoder.next_fields().await?.unwrap_or_default();
        tracing::debug!(
            source = %self.source,
            row = self.header_row,
            columns = header.len(),
            "resolved header row"
        );
        Ok(header)
    }
}

/// Turns a header label into an identifier-safe lowercase key.
///
/// Spaces become underscores, parentheses are dropped, anything else outside
/// `[A-Za-z0-9_]` becomes an underscore.
pub fn normalize_header(label: &str) -> String {
    label
        .chars()
        .filter(|c| !matches!(c, '(' | ')'))
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_labels() {
        assert_eq!(normalize_header("Bar (ito)"), "bar_ito");
        assert_eq!(normalize_header("First Name"), "first_name");
        assert_eq!(normalize_header("e-mail@home"), "e_mail_home");
        assert_eq!(normalize_header("Größe"), "gr__e");
    }

    #[test]
    fn normalization_is_idempotent() {
        for label in ["Bar (ito)", "A.B C", "x__y", "(x)"] {
            let once = normalize_header(label);
            assert_eq!(normalize_header(&once), once);
        }
    }
}
