use crate::row::{Object, Record, Row};
use crate::{CsvError, CsvResult};
use csv_async::{AsyncReaderBuilder, AsyncWriter, AsyncWriterBuilder, StringRecord, Terminator};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt, BufReader};

#[cfg(windows)]
const LINE_TERMINATOR: &[u8] = b"\r\n";
#[cfg(not(windows))]
const LINE_TERMINATOR: &[u8] = b"\n";

fn terminator() -> Terminator {
    if LINE_TERMINATOR == b"\r\n" {
        Terminator::CRLF
    } else {
        Terminator::Any(b'\n')
    }
}

fn writer_builder(delimiter: u8) -> AsyncWriterBuilder {
    let mut builder = AsyncWriterBuilder::new();
    builder
        .delimiter(delimiter)
        .flexible(true)
        .terminator(terminator());
    builder
}

/// Encodes one row as a delimited line, terminator included.
pub async fn encode_record(fields: &[String], delimiter: u8) -> CsvResult<Vec<u8>> {
    let mut line = Vec::new();
    {
        let mut wtr = writer_builder(delimiter).create_writer(&mut line);
        wtr.write_record(fields).await?;
        wtr.flush().await?;
    }
    Ok(line)
}

/// Writes an in-memory list of rows to a delimited file.
///
/// Keyed rows (records and generic objects) are realigned to the header order when a
/// header is known: on `write` the headers given to [`CsvWriter::with_headers`], on
/// `append` the first row of the existing file.
#[derive(Debug)]
pub struct CsvWriter {
    rows: Vec<Row>,
    headers: Vec<String>,
    delimiter: u8,
    path: Option<PathBuf>,
}

impl CsvWriter {
    pub fn new<I, R>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Row>,
    {
        Self {
            rows: rows.into_iter().map(Into::into).collect(),
            headers: Vec::new(),
            delimiter: b',',
            path: None,
        }
    }

    pub fn with_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn to_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Truncates the target and writes the header line (if any) followed by the rows.
    pub async fn write(&self) -> CsvResult<()> {
        self.write_mode(false).await
    }

    /// Appends the rows after the existing content; no header line is written.
    pub async fn append(&self) -> CsvResult<()> {
        self.write_mode(true).await
    }

    async fn write_mode(&self, append: bool) -> CsvResult<()> {
        let path = self.target()?;
        let mut options = OpenOptions::new();
        if append {
            options.read(true).append(true).create(true);
        } else {
            options.write(true).create(true).truncate(true);
        }
        let mut file = options.open(path).await.map_err(|source| CsvError::OpenTarget {
            path: path.to_path_buf(),
            source,
        })?;

        let known = if append {
            let known = read_first_row(&mut file, self.delimiter)
                .await?
                .unwrap_or_else(|| self.headers.clone());
            if !ends_with_newline(&mut file).await? {
                file.write_all(LINE_TERMINATOR).await?;
            }
            known
        } else {
            self.headers.clone()
        };
        tracing::debug!(
            path = %path.display(),
            append,
            rows = self.rows.len(),
            "writing csv rows"
        );

        let header_line = (!append && !self.headers.is_empty()).then_some(self.headers.as_slice());
        let written = self.emit(&mut file, &known, header_line).await;
        // Partial writes stay; the file is still flushed before it is closed.
        let flushed = file.flush().await;
        written?;
        flushed?;
        Ok(())
    }

    async fn emit(&self, file: &mut File, known: &[String], header: Option<&[String]>) -> CsvResult<()> {
        let mut wtr = writer_builder(self.delimiter).create_writer(file);
        let written = write_rows(&mut wtr, &self.rows, known, header).await;
        let flushed = wtr.flush().await;
        written?;
        flushed?;
        Ok(())
    }

    /// Inserts `fields` as line `position` (1-based) of the existing target file.
    ///
    /// Lines before `position` are copied verbatim to a scratch file, the new line is
    /// written, the rest follows, and the scratch content is copied back over the
    /// target. Positions 0 and 1 insert first; positions past the end append.
    pub async fn insert_row(&self, position: usize, fields: &[String]) -> CsvResult<()> {
        let path = self.target()?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .map_err(|source| CsvError::OpenTarget {
                path: path.to_path_buf(),
                source,
            })?;
        let mut scratch = File::from_std(tempfile::tempfile()?);
        let line = encode_record(fields, self.delimiter).await?;

        tracing::debug!(path = %path.display(), position, "inserting csv row");
        let spliced = splice(&mut file, &mut scratch, position, &line).await;
        let flushed = file.flush().await;
        spliced?;
        flushed?;
        Ok(())
    }

    fn target(&self) -> CsvResult<&Path> {
        self.path.as_deref().ok_or_else(|| {
            CsvError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "no target file set, call to_file first",
            ))
        })
    }
}

async fn write_rows<W>(
    wtr: &mut AsyncWriter<W>,
    rows: &[Row],
    known: &[String],
    header: Option<&[String]>,
) -> CsvResult<()>
where
    W: AsyncWrite + Unpin,
{
    if let Some(header) = header {
        wtr.write_record(header).await?;
    }
    for row in rows {
        wtr.write_record(row_fields(row, known)?).await?;
    }
    Ok(())
}

fn row_fields(row: &Row, known: &[String]) -> CsvResult<Vec<String>> {
    let keyed = |record: &Record| {
        if known.is_empty() {
            record.values().map(str::to_string).collect()
        } else {
            record.aligned_to(known)
        }
    };
    match row {
        Row::Fields(fields) => Ok(fields.clone()),
        Row::Record(record) | Row::Object(Object::Generic(record)) => Ok(keyed(record)),
        Row::Object(Object::Custom(object)) => Ok(keyed(&json_record(object.to_json()?)?)),
    }
}

fn json_record(value: serde_json::Value) -> CsvResult<Record> {
    use serde_json::Value;

    let map = match value {
        Value::Object(map) => map,
        other => {
            return Err(CsvError::UnsupportedRow(format!(
                "expected a JSON object, got {other}"
            )))
        }
    };
    map.into_iter()
        .map(|(key, value)| {
            let field = match value {
                Value::Null => String::new(),
                Value::String(s) => s,
                Value::Bool(_) | Value::Number(_) => value.to_string(),
                nested => {
                    return Err(CsvError::UnsupportedRow(format!(
                        "attribute {key} is not a scalar: {nested}"
                    )))
                }
            };
            Ok((key, field))
        })
        .collect()
}

async fn read_first_row(file: &mut File, delimiter: u8) -> CsvResult<Option<Vec<String>>> {
    let mut rdr = AsyncReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .create_reader(&mut *file);
    let mut record = StringRecord::new();
    if !rdr.read_record(&mut record).await? {
        return Ok(None);
    }
    Ok(Some(record.iter().map(str::to_string).collect()))
}

/// True for an empty file or one whose last byte is `\n`.
async fn ends_with_newline(file: &mut File) -> CsvResult<bool> {
    if file.metadata().await?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1)).await?;
    Ok(file.read_u8().await? == b'\n')
}

async fn splice(file: &mut File, scratch: &mut File, position: usize, line: &[u8]) -> CsvResult<()> {
    let mut lines = BufReader::new(&mut *file);
    let mut buf = Vec::new();
    let mut open_line = false;
    for _ in 1..position {
        buf.clear();
        if lines.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        open_line = !buf.ends_with(b"\n");
        scratch.write_all(&buf).await?;
    }
    if open_line {
        scratch.write_all(LINE_TERMINATOR).await?;
    }
    scratch.write_all(line).await?;
    tokio::io::copy(&mut lines, &mut *scratch).await?;
    drop(lines);

    scratch.flush().await?;
    scratch.seek(SeekFrom::Start(0)).await?;
    file.seek(SeekFrom::Start(0)).await?;
    tokio::io::copy(scratch, file).await?;
    Ok(())
}
