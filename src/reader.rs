use crate::header::HeaderResolver;
use crate::options::{Column, ReadOptions};
use crate::pipeline::{row_stream, RowFilter, RowStream};
use crate::row::{CsvObject, ObjectTypes, Row};
use crate::source::Source;
use crate::writer::CsvWriter;
use crate::{CsvError, CsvResult};
use futures::TryStreamExt;
use std::path::Path;
use std::sync::Arc;

/// Fluent entry point for reading a CSV source.
///
/// Configuration methods consume and return the reader; every consumer
/// (`stream`, `count`, `first`, `to_vec`, `each`, `to_json`) starts a fresh
/// traversal of the source with the configuration as it is at that moment.
///
/// ```no_run
/// # async fn demo() -> csv_rows::CsvResult<()> {
/// use csv_rows::Csv;
///
/// let rows = Csv::read("data.csv")
///     .map_to_headers()
///     .filter(|row| row.get("Foo") == Some("Foo1"))
///     .to_vec()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Csv {
    source: Source,
    options: ReadOptions,
    filter: Option<RowFilter>,
    types: ObjectTypes,
}

impl Csv {
    pub fn read(source: impl Into<Source>) -> Self {
        Self {
            source: source.into(),
            options: ReadOptions::default(),
            filter: None,
            types: ObjectTypes::default(),
        }
    }

    /// Starts a writer for `rows`.
    pub fn make<I, R>(rows: I) -> CsvWriter
    where
        I: IntoIterator<Item = R>,
        R: Into<Row>,
    {
        CsvWriter::new(rows)
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// Replaces the whole configuration, e.g. with options loaded from a file.
    pub fn with_options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.options.delimiter = delimiter;
        self
    }

    /// Keys rows by the labels in row 1, which is then no longer yielded as data.
    pub fn map_to_headers(self) -> Self {
        self.map_to_headers_at(1)
    }

    pub fn map_to_headers_at(mut self, header_row: usize) -> Self {
        self.options.map_to_headers = true;
        self.options.header_row = header_row;
        self
    }

    /// Keys rows by `headers`; every source row is data.
    pub fn map_to_custom_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.map_to_headers = true;
        self.set_headers(headers)
    }

    pub fn set_header_row(mut self, header_row: usize) -> Self {
        self.options.header_row = header_row;
        self
    }

    pub fn set_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the set of 1-based row numbers to drop.
    pub fn skip_rows(mut self, rows: impl IntoIterator<Item = usize>) -> Self {
        self.options.skip_rows = rows.into_iter().collect();
        self
    }

    /// Replaces the columns to drop; indices (1-based) and header names can be mixed.
    pub fn skip_columns<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Column>,
    {
        self.options.skip_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn skip_empty_rows(mut self, skip: bool) -> Self {
        self.options.skip_empty_rows = skip;
        self
    }

    /// Keeps only rows for which `predicate` holds. It sees rows in their final shape.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Row) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(predicate));
        self
    }

    /// Yields generic objects keyed by normalized header labels.
    pub fn map_to_object(mut self) -> Self {
        self.options.map_to_headers = true;
        self.options.map_to_object = true;
        self.options.object_type = None;
        self
    }

    /// Yields objects of the type registered as `type_name`, or generic objects if
    /// no such type is registered.
    pub fn map_to_object_as(mut self, type_name: impl Into<String>) -> Self {
        self = self.map_to_object();
        self.options.object_type = Some(type_name.into());
        self
    }

    pub fn map_to_object_of<T: CsvObject + Default>(self) -> Self {
        let name = std::any::type_name::<T>();
        self.register_object::<T>(name).map_to_object_as(name)
    }

    pub fn register_object<T: CsvObject + Default>(mut self, type_name: impl Into<String>) -> Self {
        self.types.register::<T>(type_name);
        self
    }

    /// Lazily yields the rows; nothing is read until the stream is polled.
    pub fn stream(&self) -> RowStream {
        row_stream(
            self.source.clone(),
            self.options.clone(),
            self.filter.clone(),
            self.types.clone(),
        )
    }

    pub async fn count(&self) -> CsvResult<usize> {
        self.stream().try_fold(0, |n, _| async move { Ok(n + 1) }).await
    }

    /// The first row, reading no further than needed.
    pub async fn first(&self) -> CsvResult<Option<Row>> {
        self.stream().try_next().await
    }

    /// Loads every row into memory. Use [`Csv::stream`] or [`Csv::each`] for large sources.
    pub async fn to_vec(&self) -> CsvResult<Vec<Row>> {
        self.stream().try_collect().await
    }

    pub async fn each<F>(&self, mut callback: F) -> CsvResult<()>
    where
        F: FnMut(Row),
    {
        let mut rows = self.stream();
        while let Some(row) = rows.try_next().await? {
            callback(row);
        }
        Ok(())
    }

    /// All rows as a JSON array. Loads every row into memory.
    pub async fn to_json(&self) -> CsvResult<String> {
        let rows = self.to_vec().await?;
        Ok(serde_json::to_string(&rows)?)
    }

    /// The header labels: the explicit ones, or row `header_row` of the source.
    pub async fn header_row(&self) -> CsvResult<Vec<String>> {
        HeaderResolver::new(
            self.source.clone(),
            self.options.delimiter,
            self.options.header_row(),
        )
        .with_explicit(self.options.headers.clone())
        .resolve()
        .await
    }

    /// Appends `rows` to the source file, aligning keyed rows to its first line.
    pub async fn append<I, R>(&self, rows: I) -> CsvResult<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<Row>,
    {
        CsvWriter::new(rows)
            .delimiter(self.options.delimiter)
            .to_file(self.writable_path()?)
            .append()
            .await
    }

    /// Inserts `row` at data position `position`, shifted past the skipped rows.
    pub async fn insert_at<I, S>(&self, position: usize, row: I) -> CsvResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = row.into_iter().map(Into::into).collect();
        let position = position + self.options.effective_skip_rows().len();
        CsvWriter::new(Vec::<Row>::new())
            .delimiter(self.options.delimiter)
            .to_file(self.writable_path()?)
            .insert_row(position, &fields)
            .await
    }

    fn writable_path(&self) -> CsvResult<&Path> {
        self.source
            .local_path()
            .ok_or_else(|| CsvError::ReadOnlySource(self.source.to_string()))
    }
}
