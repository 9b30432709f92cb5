//! Where rows come from: a local path or an HTTP(S) URL.

use crate::io::{build_csv_reader, reader_from_path, ByteStream, CsvMeta};
use crate::{CsvError, CsvResult};
use bytes::Bytes;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use url::Url;

const SHEETS_MARKER: &str = "docs.google.com/spreadsheets";

/// A readable CSV location. Cloning a URL source shares its fetched body.
#[derive(Clone)]
pub enum Source {
    Path(PathBuf),
    Url(RemoteCsv),
}

impl Source {
    /// Opens an independent read cursor at the start of the source.
    pub async fn open(&self) -> CsvResult<ByteStream> {
        match self {
            Source::Path(path) => {
                let (reader, _meta) = reader_from_path(path).await?;
                tracing::debug!(path = %path.display(), "opened local source");
                Ok(reader)
            }
            Source::Url(remote) => remote.open().await,
        }
    }

    /// The local path, if this source can be written back to.
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Source::Path(path) => Some(path.as_path()),
            Source::Url(_) => None,
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Source::Url(remote) => f.debug_tuple("Url").field(&remote.url).finish(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(path) => write!(f, "{}", path.display()),
            Source::Url(remote) => f.write_str(&remote.url),
        }
    }
}

impl From<&str> for Source {
    fn from(location: &str) -> Self {
        if location.starts_with("http") {
            Source::Url(RemoteCsv::new(location))
        } else {
            Source::Path(PathBuf::from(location))
        }
    }
}

impl From<String> for Source {
    fn from(location: String) -> Self {
        Source::from(location.as_str())
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&PathBuf> for Source {
    fn from(path: &PathBuf) -> Self {
        Source::Path(path.clone())
    }
}

/// A CSV document behind a URL, fetched at most once.
#[derive(Clone)]
pub struct RemoteCsv {
    url: String,
    body: Arc<OnceCell<(Bytes, CsvMeta)>>,
}

impl RemoteCsv {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: Arc::new(OnceCell::new()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn open(&self) -> CsvResult<ByteStream> {
        let (bytes, meta) = self.body.get_or_try_init(|| fetch(&self.url)).await?;
        Ok(build_csv_reader(Cursor::new(bytes.clone()), meta))
    }
}

async fn fetch(location: &str) -> CsvResult<(Bytes, CsvMeta)> {
    let url = if location.contains(SHEETS_MARKER) {
        normalize_sheets_url(location)?
    } else {
        location.to_string()
    };
    tracing::debug!(%url, "fetching remote csv");

    let fetch_err = |source| CsvError::Fetch {
        url: url.clone(),
        source,
    };
    let response = reqwest::get(&url)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(fetch_err)?;

    let header = |name: reqwest::header::HeaderName| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let content_type = header(reqwest::header::CONTENT_TYPE);
    let content_encoding = header(reqwest::header::CONTENT_ENCODING);
    let name_hint = response
        .url()
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default()
        .to_string();
    let meta = CsvMeta::from_http(&name_hint, content_type.as_deref(), content_encoding.as_deref());

    let body = response.bytes().await.map_err(fetch_err)?;
    tracing::debug!(%url, bytes = body.len(), "fetched remote csv");
    Ok((body, meta))
}

/// Rewrites a Google Sheets URL so it requests the published CSV export.
///
/// `output=csv` and `gid=0` are defaults; query parameters already on the URL win.
pub fn normalize_sheets_url(location: &str) -> CsvResult<String> {
    let mut url = Url::parse(location)?;

    let mut query: Vec<(String, String)> = vec![
        ("output".into(), "csv".into()),
        ("gid".into(), "0".into()),
    ];
    for (key, value) in url.query_pairs() {
        match query.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value.into_owned(),
            None => query.push((key.into_owned(), value.into_owned())),
        }
    }

    let mut path = url.path().replace("/edit", "");
    let trimmed = path.trim_end_matches('/').len();
    path.truncate(trimmed);
    if !path.ends_with("/pub") {
        path.push_str("/pub");
    }
    url.set_path(&path);
    url.set_fragment(None);
    url.query_pairs_mut().clear().extend_pairs(&query);

    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_sheet_url_gets_csv_export() {
        let url = normalize_sheets_url("https://docs.google.com/spreadsheets/d/abc123/edit").unwrap();
        assert_eq!(
            url,
            "https://docs.google.com/spreadsheets/d/abc123/pub?output=csv&gid=0"
        );
    }

    #[test]
    fn existing_sheet_selector_is_kept() {
        let url = normalize_sheets_url(
            "https://docs.google.com/spreadsheets/d/e/xyz/pub?gid=103922319&single=true&output=csv",
        )
        .unwrap();
        assert_eq!(
            url,
            "https://docs.google.com/spreadsheets/d/e/xyz/pub?output=csv&gid=103922319&single=true"
        );
    }

    #[test]
    fn location_kind() {
        assert!(matches!(Source::from("https://example.com/a.csv"), Source::Url(_)));
        assert!(matches!(Source::from("data/a.csv"), Source::Path(_)));
    }
}
