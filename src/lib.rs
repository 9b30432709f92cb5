//! Row-oriented CSV reading and writing.
//!
//! - Reading: [`Csv::read`] builds a lazy row pipeline over a local file or URL
//!   (row/column skipping, header mapping, object materialization, filtering).
//!   Rows are pulled one at a time, so memory stays bounded by a single row
//!   unless a consumer like [`Csv::to_vec`] opts into materialization.
//! - Writing: [`CsvWriter`] writes, appends, or inserts rows into a delimited file.
//!
//! Data shape:
//! - [`Row::Fields`] plain ordered fields
//! - [`Row::Record`] header-keyed fields in header order
//! - [`Row::Object`] a generic keyed object or a registered [`CsvObject`]
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod codec;
mod header;
mod io;
mod lines;
mod options;
mod pipeline;
mod reader;
mod row;
mod source;
mod writer;

pub use crate::header::{normalize_header, HeaderResolver};
pub use crate::io::{build_csv_reader, reader_from_path, ByteStream, CsvMeta};
pub use crate::options::{Column, ReadOptions};
pub use crate::pipeline::{row_stream, RowFilter, RowPipeline, RowStream};
pub use crate::reader::Csv;
pub use crate::row::{AsAny, CsvObject, Object, ObjectTypes, Record, Row};
pub use crate::source::{normalize_sheets_url, RemoteCsv, Source};
pub use crate::writer::{encode_record, CsvWriter};

use std::path::PathBuf;
use thiserror::Error;

/// Error type returned by this crate.
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("Header row {row} not found: source ended first")]
    HeaderRowNotFound { row: usize },
    #[error("Could not open source {}: {source}", path.display())]
    OpenSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not open file: {}: {source}", path.display())]
    OpenTarget {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to fetch CSV from URL: {url}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
    #[error("Source is not a writable file: {0}")]
    ReadOnlySource(String),
    #[error("Row cannot be written as CSV: {0}")]
    UnsupportedRow(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv_async::Error),
}

pub type CsvResult<T> = std::result::Result<T, CsvError>;
