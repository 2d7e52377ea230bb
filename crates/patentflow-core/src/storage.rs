use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use tracing::{debug, info};

use crate::error::DocumentError;

// ── Collaborator traits ──────────────────────────────────────────────────

#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, DocumentError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Writes `name` into `container` and returns its address, without any
    /// access token.
    async fn store(
        &self,
        container: &str,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, DocumentError>;
}

// ── Addressing helpers ───────────────────────────────────────────────────

/// Drops the query string (SAS token) so a URL can be logged.
pub fn sanitize_url(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

/// Splits a blob URL into the container URL (query preserved) and the blob
/// name inside it. Local paths split into parent directory and file name.
pub fn split_container_and_name(url: &str) -> Result<(String, String), DocumentError> {
    let invalid = || DocumentError::InvalidLocation(sanitize_url(url).to_string());

    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
            let path = parsed.path().trim_start_matches('/').to_string();
            let (container, name) = path
                .split_once('/')
                .filter(|(c, n)| !c.is_empty() && !n.is_empty())
                .ok_or_else(invalid)?;
            let mut container_url = parsed.clone();
            container_url.set_path(&format!("/{container}"));
            Ok((container_url.to_string(), name.to_string()))
        }
        Ok(parsed) if parsed.scheme() == "file" => {
            let path = parsed.to_file_path().map_err(|_| invalid())?;
            split_path(&path).ok_or_else(invalid)
        }
        _ => split_path(Path::new(url)).ok_or_else(invalid),
    }
}

fn split_path(path: &Path) -> Option<(String, String)> {
    let name = path.file_name()?.to_str()?.to_string();
    let parent = path.parent()?.to_str()?;
    let parent = if parent.is_empty() { "." } else { parent };
    Some((parent.to_string(), name))
}

/// File name of the document without its extension.
pub fn base_name(url: &str) -> Option<String> {
    let last = sanitize_url(url).rsplit('/').next()?;
    let stem = Path::new(last).file_stem()?.to_str()?;
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Address of `name` inside `container`, keeping the container's query.
pub fn blob_url(container: &str, name: &str) -> String {
    match container.split_once('?') {
        Some((base, query)) => format!("{}/{name}?{query}", base.trim_end_matches('/')),
        None => format!("{}/{name}", container.trim_end_matches('/')),
    }
}

// ── HTTP blob storage ────────────────────────────────────────────────────

/// Reads and writes blobs over plain HTTP(S). Uploads use the block-blob
/// PUT convention; the SAS token travels in the query string.
pub struct HttpBlobStore {
    client: reqwest::Client,
    sas_token: Option<String>,
}

impl HttpBlobStore {
    pub fn new(timeout_secs: u64) -> Result<Self, DocumentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DocumentError::InvalidLocation(format!("http client: {e}")))?;
        Ok(Self {
            client,
            sas_token: None,
        })
    }

    /// Token appended to URLs that carry no query of their own.
    pub fn with_sas_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        let token = token.trim_start_matches('?').to_string();
        self.sas_token = (!token.is_empty()).then_some(token);
        self
    }

    fn authorize(&self, url: &str) -> String {
        match &self.sas_token {
            Some(token) if !url.contains('?') => format!("{url}?{token}"),
            _ => url.to_string(),
        }
    }
}

#[async_trait]
impl DocumentFetcher for HttpBlobStore {
    async fn fetch(&self, url: &str) -> Result<Bytes, DocumentError> {
        let shown = sanitize_url(url).to_string();
        let unretrievable = |reason: String| DocumentError::Unretrievable {
            url: shown.clone(),
            reason,
        };

        debug!(url = %shown, "fetching document");
        let response = self
            .client
            .get(self.authorize(url))
            .send()
            .await
            .map_err(|e| unretrievable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(unretrievable(format!("HTTP {status}")));
        }
        let data = response.bytes().await.map_err(|e| unretrievable(e.to_string()))?;
        info!(url = %shown, bytes = data.len(), "document fetched");
        Ok(data)
    }
}

#[async_trait]
impl DocumentStore for HttpBlobStore {
    async fn store(
        &self,
        container: &str,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, DocumentError> {
        let url = self.authorize(&blob_url(container, name));
        let failed = |reason: String| DocumentError::StoreFailed {
            name: name.to_string(),
            reason,
        };

        let size = data.len();
        let response = self
            .client
            .put(&url)
            .header("x-ms-blob-type", "BlockBlob")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("HTTP {status}: {body}")));
        }

        let public = sanitize_url(&url).to_string();
        info!(url = %public, bytes = size, "document stored");
        Ok(public)
    }
}

// ── Local filesystem ─────────────────────────────────────────────────────

/// Filesystem stand-in for blob storage. Local containers are written in
/// place; remote containers are mirrored under `root/<host>/<path>`.
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, location: &str) -> Result<PathBuf, DocumentError> {
        match Url::parse(location) {
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map_err(|_| DocumentError::InvalidLocation(location.to_string())),
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let host = url.host_str().unwrap_or("localhost");
                let mut dir = self.root.join(host);
                for segment in url.path().split('/').filter(|s| !s.is_empty()) {
                    dir.push(segment);
                }
                Ok(dir)
            }
            _ => {
                let path = Path::new(location);
                Ok(if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    self.root.join(path)
                })
            }
        }
    }
}

#[async_trait]
impl DocumentFetcher for LocalDirStore {
    async fn fetch(&self, url: &str) -> Result<Bytes, DocumentError> {
        let path = self.resolve(sanitize_url(url))?;
        let data = tokio::fs::read(&path).await.map_err(|e| DocumentError::Unretrievable {
            url: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Bytes::from(data))
    }
}

#[async_trait]
impl DocumentStore for LocalDirStore {
    async fn store(
        &self,
        container: &str,
        name: &str,
        data: Bytes,
        _content_type: &str,
    ) -> Result<String, DocumentError> {
        let failed = |e: std::io::Error| DocumentError::StoreFailed {
            name: name.to_string(),
            reason: e.to_string(),
        };
        let dir = self.resolve(sanitize_url(container))?;
        tokio::fs::create_dir_all(&dir).await.map_err(failed)?;
        let path = dir.join(name);
        tokio::fs::write(&path, &data).await.map_err(failed)?;
        info!(path = %path.display(), bytes = data.len(), "document stored");
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HISTORY: &str =
        "https://acct.blob.core.windows.net/filings/2024/US123_history.pdf?sv=2022&sig=abc";

    #[test]
    fn splits_blob_url_and_keeps_sas() {
        let (container, name) = split_container_and_name(HISTORY).unwrap();
        assert_eq!(container, "https://acct.blob.core.windows.net/filings?sv=2022&sig=abc");
        assert_eq!(name, "2024/US123_history.pdf");
    }

    #[test]
    fn rejects_url_without_blob_name() {
        assert!(split_container_and_name("https://acct.blob.core.windows.net/filings").is_err());
    }

    #[test]
    fn splits_local_path() {
        let (container, name) = split_container_and_name("/data/in/US123_history.pdf").unwrap();
        assert_eq!(container, "/data/in");
        assert_eq!(name, "US123_history.pdf");
    }

    #[test]
    fn base_name_drops_extension_and_query() {
        assert_eq!(base_name(HISTORY).as_deref(), Some("US123_history"));
        assert_eq!(base_name("/tmp/x/file.pdf").as_deref(), Some("file"));
    }

    #[test]
    fn blob_url_inserts_before_query() {
        assert_eq!(
            blob_url("https://a.net/c?sig=1", "r.md"),
            "https://a.net/c/r.md?sig=1"
        );
        assert_eq!(blob_url("https://a.net/c/", "r.md"), "https://a.net/c/r.md");
    }

    #[test]
    fn sanitize_strips_token() {
        assert_eq!(sanitize_url(HISTORY), "https://acct.blob.core.windows.net/filings/2024/US123_history.pdf");
    }

    #[tokio::test]
    async fn local_store_round_trips_through_container() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirStore::new(dir.path());
        let container = format!("{}/out", dir.path().display());
        let written = store
            .store(&container, "a.md", Bytes::from_static(b"# A"), "text/markdown")
            .await
            .unwrap();
        let data = store.fetch(&written).await.unwrap();
        assert_eq!(&data[..], b"# A");
    }

    #[tokio::test]
    async fn local_store_mirrors_remote_containers() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirStore::new(dir.path());
        let written = store
            .store("https://acct.blob.core.windows.net/filings?sig=x", "r.md", Bytes::from_static(b"r"), "text/markdown")
            .await
            .unwrap();
        assert!(written.ends_with("acct.blob.core.windows.net/filings/r.md"));
    }

    #[tokio::test]
    async fn missing_local_file_is_unretrievable() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirStore::new(dir.path());
        let err = store.fetch("missing.pdf").await.unwrap_err();
        assert!(matches!(err, DocumentError::Unretrievable { .. }));
    }
}
