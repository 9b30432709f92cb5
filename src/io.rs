use crate::{CsvError, CsvResult};
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

use crate::codec::Transcoder;

/// Boxed byte stream handed to the row decoder.
pub type ByteStream = Box<dyn AsyncRead + Unpin + Send>;

#[derive(Debug, Clone)]
pub struct CsvMeta {
    /// Media type without parameters, e.g. "application/gzip" or "text/csv"
    pub content_type: String,
    /// e.g. "gzip", "zstd", or empty
    pub content_encoding: String,
    /// File or URL name, used for extension fallback
    pub name_hint: String,
    /// Which character encoding to expect (defaults to UTF-8)
    pub charset: &'static encoding_rs::Encoding,
}

impl Default for CsvMeta {
    fn default() -> Self {
        Self {
            content_type: String::new(),
            content_encoding: String::new(),
            name_hint: String::new(),
            charset: encoding_rs::UTF_8,
        }
    }
}

impl CsvMeta {
    /// Meta for an HTTP body, from its `Content-Type` and `Content-Encoding` headers.
    pub fn from_http(name_hint: &str, content_type: Option<&str>, content_encoding: Option<&str>) -> Self {
        let mut meta = CsvMeta {
            name_hint: name_hint.to_string(),
            content_encoding: content_encoding.unwrap_or_default().to_string(),
            ..Default::default()
        };
        if let Some(ct) = content_type {
            let mut parts = ct.split(';');
            meta.content_type = parts.next().unwrap_or_default().trim().to_string();
            for param in parts {
                if let Some((key, value)) = param.split_once('=') {
                    if key.trim().eq_ignore_ascii_case("charset") {
                        let label = value.trim().trim_matches('"');
                        meta.charset = encoding_rs::Encoding::for_label(label.as_bytes())
                            .unwrap_or(encoding_rs::UTF_8);
                    }
                }
            }
        }
        meta
    }

    /// Meta guessed from a local file name.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or_default();

        let (content_type, content_encoding) = match ext {
            "gz" => ("application/gzip", "gzip"),
            "zst" => ("application/zstd", "zstd"),
            _ => ("text/csv", ""),
        };
        CsvMeta {
            content_type: content_type.into(),
            content_encoding: content_encoding.into(),
            name_hint: name,
            ..Default::default()
        }
    }

    fn compression(&self) -> Compression {
        let ce = self.content_encoding.to_ascii_lowercase();
        let ct = self.content_type.to_ascii_lowercase();
        let name = self.name_hint.to_ascii_lowercase();
        let encoded = |token: &str| ce.split(',').any(|s| s.trim() == token);

        if encoded("gzip")
            || matches!(ct.as_str(), "application/gzip" | "application/x-gzip")
            || name.ends_with(".gz")
        {
            Compression::Gzip
        } else if encoded("zstd") || ct == "application/zstd" || name.ends_with(".zst") {
            Compression::Zstd
        } else {
            Compression::None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
    Zstd,
}

/// Wraps a raw byte source with decompression and UTF-8 transcoding as `meta` dictates.
pub fn build_csv_reader<R>(raw: R, meta: &CsvMeta) -> ByteStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = BufReader::with_capacity(1 << 16, raw);
    let decompressed: ByteStream = match meta.compression() {
        Compression::Gzip => Box::new(GzipDecoder::new(buf)),
        Compression::Zstd => Box::new(ZstdDecoder::new(buf)),
        Compression::None => Box::new(buf),
    };

    if meta.charset == encoding_rs::UTF_8 {
        return decompressed;
    }
    tracing::debug!(charset = meta.charset.name(), "transcoding source to UTF-8");
    let framed = FramedRead::new(decompressed, Transcoder::new(meta.charset));
    Box::new(StreamReader::new(framed))
}

/// Opens a local file for reading, with the meta derived from its extension.
pub async fn reader_from_path(path: &Path) -> CsvResult<(ByteStream, CsvMeta)> {
    let file = File::open(path).await.map_err(|source| CsvError::OpenSource {
        path: path.to_path_buf(),
        source,
    })?;
    let meta = CsvMeta::from_path(path);
    Ok((build_csv_reader(file, &meta), meta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_meta_reads_charset_and_strips_params() {
        let meta = CsvMeta::from_http(
            "export",
            Some("text/csv; charset=\"ISO-8859-1\""),
            None,
        );
        assert_eq!(meta.content_type, "text/csv");
        assert_eq!(meta.charset, encoding_rs::WINDOWS_1252);
        assert_eq!(meta.compression(), Compression::None);
    }

    #[test]
    fn compression_from_extension() {
        assert_eq!(CsvMeta::from_path(Path::new("a.csv.gz")).compression(), Compression::Gzip);
        assert_eq!(CsvMeta::from_path(Path::new("a.csv.zst")).compression(), Compression::Zstd);
        assert_eq!(CsvMeta::from_path(Path::new("a.csv")).compression(), Compression::None);
    }
}
