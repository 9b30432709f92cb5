use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A column to drop: a 1-based position or a header label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Column {
    Index(usize),
    Name(String),
}

impl From<usize> for Column {
    fn from(index: usize) -> Self {
        Column::Index(index)
    }
}

impl From<&str> for Column {
    fn from(name: &str) -> Self {
        Column::Name(name.to_string())
    }
}

impl From<String> for Column {
    fn from(name: String) -> Self {
        Column::Name(name)
    }
}

/// Read pipeline configuration.
///
/// Row and column numbers are 1-based. Row numbers count decoded rows before any
/// other processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    pub delimiter: u8,
    pub header_row: usize,
    pub map_to_headers: bool,
    /// Explicit header labels; empty means read them from `header_row`.
    pub headers: Vec<String>,
    pub skip_rows: BTreeSet<usize>,
    pub skip_columns: Vec<Column>,
    pub skip_empty_rows: bool,
    pub map_to_object: bool,
    /// Registered object type to materialize into; unknown names give generic objects.
    pub object_type: Option<String>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            header_row: 1,
            map_to_headers: false,
            headers: Vec::new(),
            skip_rows: BTreeSet::new(),
            skip_columns: Vec::new(),
            skip_empty_rows: false,
            map_to_object: false,
            object_type: None,
        }
    }
}

impl ReadOptions {
    /// The 1-based header row; 0 is read as 1.
    pub fn header_row(&self) -> usize {
        if self.header_row == 0 {
            tracing::debug!("header_row 0 treated as row 1");
            return 1;
        }
        self.header_row
    }

    /// Rows dropped before any other processing, including the header row when
    /// headers are read from the source.
    pub fn effective_skip_rows(&self) -> BTreeSet<usize> {
        let mut rows = self.skip_rows.clone();
        if self.map_to_headers && self.headers.is_empty() {
            rows.insert(self.header_row());
        }
        rows
    }

    pub(crate) fn skip_indices(&self) -> BTreeSet<usize> {
        self.skip_columns
            .iter()
            .filter_map(|c| match c {
                Column::Index(i) => Some(*i),
                Column::Name(_) => None,
            })
            .collect()
    }

    pub(crate) fn skip_names(&self) -> Vec<&str> {
        self.skip_columns
            .iter()
            .filter_map(|c| match c {
                Column::Name(name) => Some(name.as_str()),
                Column::Index(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_row_joins_skip_set_only_when_read_from_source() {
        let mut opts = ReadOptions {
            map_to_headers: true,
            header_row: 2,
            skip_rows: [5].into(),
            ..Default::default()
        };
        assert_eq!(opts.effective_skip_rows(), BTreeSet::from([2, 5]));

        opts.headers = vec!["a".into()];
        assert_eq!(opts.effective_skip_rows(), BTreeSet::from([5]));
    }

    #[test]
    fn deserializes_mixed_columns() {
        let opts: ReadOptions =
            serde_json::from_str(r#"{"delimiter":59,"skip_columns":[1,"Foo"]}"#).unwrap();
        assert_eq!(opts.delimiter, b';');
        assert_eq!(opts.skip_columns, [Column::Index(1), Column::from("Foo")]);
        assert_eq!(opts.header_row, 1);
    }

    #[test]
    fn header_row_zero_reads_as_first_row() {
        let opts: ReadOptions = serde_json::from_str(r#"{"header_row":0,"map_to_headers":true}"#).unwrap();
        assert_eq!(opts.header_row(), 1);
        assert_eq!(opts.effective_skip_rows(), BTreeSet::from([1]));
    }
}
