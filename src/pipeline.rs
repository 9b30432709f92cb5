//! The per-row transformation pipeline and the lazy row stream built on it.

use crate::header::{normalize_header, HeaderResolver};
use crate::io::ByteStream;
use crate::lines::{Line, LineLog, PhysicalLines};
use crate::options::ReadOptions;
use crate::row::{ObjectTypes, Record, Row};
use crate::source::Source;
use crate::{CsvError, CsvResult};
use csv_async::{AsyncReader, AsyncReaderBuilder, StringRecord};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Row predicate; rows for which it returns false are dropped.
pub type RowFilter = Arc<dyn Fn(&Row) -> bool + Send + Sync>;

/// Lazily decoded, transformed rows. Dropping it releases the read handle.
pub type RowStream = BoxStream<'static, CsvResult<Row>>;

/// Decodes delimited rows from a byte stream, numbering physical rows from 1.
///
/// A blank line is a row of one empty field, so row numbers match line positions
/// (quoted multi-line fields aside).
pub(crate) struct RowDecoder {
    reader: AsyncReader<PhysicalLines<ByteStream>>,
    lines: LineLog,
    record: StringRecord,
    /// A record read ahead of the blank lines logged before it.
    pending: Option<Vec<String>>,
    rows_read: usize,
}

impl RowDecoder {
    pub(crate) fn new(bytes: ByteStream, delimiter: u8) -> Self {
        let lines = LineLog::default();
        let reader = AsyncReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .buffer_capacity(1 << 16)
            .create_reader(PhysicalLines::new(bytes, delimiter, lines.clone()));
        Self {
            reader,
            lines,
            record: StringRecord::new(),
            pending: None,
            rows_read: 0,
        }
    }

    pub(crate) async fn next_fields(&mut self) -> CsvResult<Option<Vec<String>>> {
        loop {
            let fields = match self.lines.pop() {
                Some(Line::Blank) => Some(vec![String::new()]),
                Some(Line::Record) => match self.pending.take() {
                    Some(fields) => Some(fields),
                    None => self.read_record().await?,
                },
                None => {
                    if self.pending.is_none() {
                        match self.read_record().await? {
                            Some(fields) => self.pending = Some(fields),
                            None if self.lines.is_empty() => return Ok(None),
                            None => {}
                        }
                        continue;
                    }
                    self.pending.take()
                }
            };
            if let Some(fields) = fields {
                self.rows_read += 1;
                return Ok(Some(fields));
            }
        }
    }

    async fn read_record(&mut self) -> CsvResult<Option<Vec<String>>> {
        if !self.reader.read_record(&mut self.record).await? {
            return Ok(None);
        }
        Ok(Some(self.record.iter().map(str::to_string).collect()))
    }

    /// Next row with its 1-based row number.
    pub(crate) async fn next_row(&mut self) -> CsvResult<Option<(usize, Vec<String>)>> {
        Ok(self
            .next_fields()
            .await?
            .map(|fields| (self.rows_read, fields)))
    }
}

#[derive(Debug)]
struct ResolvedHeader {
    /// As read (or supplied), used to find columns skipped by name.
    raw: Vec<String>,
    /// Column-aligned with data rows; normalized when materializing objects.
    keys: Vec<String>,
}

/// Applies the configured row transformations, one row at a time.
///
/// Order: skip by row number, skip empty rows, drop columns by index, drop columns
/// by header name, header association, object materialization, predicate.
pub struct RowPipeline {
    options: Arc<ReadOptions>,
    skip_rows: BTreeSet<usize>,
    skip_indices: BTreeSet<usize>,
    skip_names: Vec<String>,
    resolver: HeaderResolver,
    filter: Option<RowFilter>,
    types: ObjectTypes,
    header: Option<Arc<ResolvedHeader>>,
}

impl RowPipeline {
    pub fn new(
        source: Source,
        options: Arc<ReadOptions>,
        filter: Option<RowFilter>,
        types: ObjectTypes,
    ) -> Self {
        let resolver = HeaderResolver::new(source, options.delimiter, options.header_row())
            .with_explicit(options.headers.clone());
        Self {
            skip_rows: options.effective_skip_rows(),
            skip_indices: options.skip_indices(),
            skip_names: options.skip_names().into_iter().map(String::from).collect(),
            resolver,
            filter,
            types,
            header: None,
            options,
        }
    }

    /// Decides whether row `row_number` is kept and, if so, shapes it.
    pub async fn prepare(&mut self, row_number: usize, fields: Vec<String>) -> CsvResult<Option<Row>> {
        if self.skip_rows.contains(&row_number) {
            return Ok(None);
        }
        if self.options.skip_empty_rows && fields.iter().all(|f| f.trim().is_empty()) {
            return Ok(None);
        }

        let row = self.shape(fields).await?;

        if let Some(filter) = &self.filter {
            if !filter(&row) {
                return Ok(None);
            }
        }
        Ok(Some(row))
    }

    async fn shape(&mut self, fields: Vec<String>) -> CsvResult<Row> {
        let fields = skip_by_index(fields, &self.skip_indices);
        if !self.options.map_to_headers && self.skip_names.is_empty() {
            return Ok(Row::Fields(fields));
        }

        let header = self.header().await?;
        let fields = skip_by_name(fields, &header.raw, &self.skip_names);
        if !self.options.map_to_headers {
            return Ok(Row::Fields(fields));
        }

        if header.keys.is_empty() {
            tracing::trace!("empty header, passing row through");
            return Ok(Row::Fields(fields));
        }
        if header.keys.len() != fields.len() {
            tracing::trace!(
                header = header.keys.len(),
                row = fields.len(),
                "row length differs from header, passing row through"
            );
            return Ok(Row::Fields(fields));
        }

        let record = Record::zip(&header.keys, fields);
        if !self.options.map_to_object {
            return Ok(Row::Record(record));
        }
        let object = self
            .types
            .materialize(self.options.object_type.as_deref(), record);
        Ok(Row::Object(object))
    }

    /// Resolved once per run; later rows reuse it.
    async fn header(&mut self) -> CsvResult<Arc<ResolvedHeader>> {
        if let Some(header) = &self.header {
            return Ok(Arc::clone(header));
        }

        let raw = self.resolver.resolve().await?;
        let aligned = skip_by_name(skip_by_index(raw.clone(), &self.skip_indices), &raw, &self.skip_names);
        let keys: Vec<String> = if self.options.map_to_object {
            aligned.iter().map(|h| normalize_header(h)).collect()
        } else {
            aligned
        };

        let header = Arc::new(ResolvedHeader { raw, keys });
        self.header = Some(Arc::clone(&header));
        Ok(header)
    }
}

/// Drops 1-based positions, all resolved against the row as given.
fn skip_by_index(fields: Vec<String>, indices: &BTreeSet<usize>) -> Vec<String> {
    if indices.is_empty() {
        return fields;
    }
    fields
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !indices.contains(&(i + 1)))
        .map(|(_, f)| f)
        .collect()
}

/// Drops the positions where `names` appear in `header`, in one pass over `fields`.
fn skip_by_name(fields: Vec<String>, header: &[String], names: &[String]) -> Vec<String> {
    if names.is_empty() {
        return fields;
    }
    let positions: BTreeSet<usize> = names
        .iter()
        .filter_map(|name| header.iter().position(|h| h == name))
        .collect();
    fields
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !positions.contains(i))
        .map(|(_, f)| f)
        .collect()
}

struct StreamState {
    source: Source,
    delimiter: u8,
    decoder: Option<RowDecoder>,
    pipeline: RowPipeline,
}

/// Builds the lazy row stream for `source`.
///
/// Nothing is opened until the first poll. A local file that cannot be opened yields
/// no rows; other failures surface as the stream's error item.
pub fn row_stream(
    source: Source,
    options: ReadOptions,
    filter: Option<RowFilter>,
    types: ObjectTypes,
) -> RowStream {
    let options = Arc::new(options);
    let state = StreamState {
        delimiter: options.delimiter,
        pipeline: RowPipeline::new(source.clone(), options, filter, types),
        source,
        decoder: None,
    };

    stream::try_unfold(state, |mut state| async move {
        if state.decoder.is_none() {
            match state.source.open().await {
                Ok(bytes) => state.decoder = Some(RowDecoder::new(bytes, state.delimiter)),
                Err(CsvError::OpenSource { path, source }) => {
                    tracing::debug!(path = %path.display(), error = %source, "source not readable, no rows");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }

        loop {
            let Some(decoder) = state.decoder.as_mut() else {
                return Ok(None);
            };
            let Some((row_number, fields)) = decoder.next_row().await? else {
                return Ok(None);
            };
            if let Some(row) = state.pipeline.prepare(row_number, fields).await? {
                return Ok(Some((row, state)));
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn index_skip_uses_original_positions() {
        let out = skip_by_index(strings(&["a", "b", "c", "d"]), &[1, 2].into());
        assert_eq!(out, ["c", "d"]);
    }

    #[test]
    fn name_skip_applies_after_index_skip() {
        let header = strings(&["Foo", "Bar", "Baz"]);
        let row = skip_by_index(strings(&["Foo1", "Bar1", "Baz1"]), &[1].into());
        let out = skip_by_name(row, &header, &strings(&["Foo"]));
        assert_eq!(out, ["Baz1"]);
    }

    #[test]
    fn unknown_name_is_ignored() {
        let header = strings(&["Foo", "Bar"]);
        let out = skip_by_name(strings(&["1", "2"]), &header, &strings(&["Nope"]));
        assert_eq!(out, ["1", "2"]);
    }
}
