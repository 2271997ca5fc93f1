//! Source archive acquisition
//!
//! Downloads recipe source archives into a shared cache with checksum
//! verification. Downloads are made once; a failure aborts the recipe and
//! is never retried. The async [`DownloadManager`] is driven from the
//! synchronous orchestrator by [`HttpFetcher`], which owns a private
//! current-thread runtime.

use futures::StreamExt;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::config::defaults;
use crate::core::recipe::{Checksum, ResolvedSource};
use crate::error::FetchError;

/// Download result containing file path and metadata
#[derive(Debug)]
pub struct DownloadResult {
    /// Path to the downloaded file
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
}

/// Incremental digest matching a declared checksum's algorithm
enum Hasher {
    Sha256(Sha256),
    Md5(Md5),
}

impl Hasher {
    fn for_checksum(checksum: &Checksum) -> Self {
        match checksum {
            Checksum::Sha256(_) => Hasher::Sha256(Sha256::new()),
            Checksum::Md5(_) => Hasher::Md5(Md5::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(data),
            Hasher::Md5(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Md5(h) => hex::encode(h.finalize()),
        }
    }
}

/// Async HTTP downloader
#[derive(Debug, Clone)]
pub struct DownloadManager {
    /// HTTP client
    client: reqwest::Client,
}

impl DownloadManager {
    /// Create a new download manager
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(600))
                .connect_timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Download `url` to `dest`
    ///
    /// A partial file is removed when the transfer fails.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<DownloadResult, FetchError> {
        let result = self.download_once(url, dest).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(dest).await;
        }
        result
    }

    async fn download_once(&self, url: &str, dest: &Path) -> Result<DownloadResult, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::NetworkError {
                url: url.to_string(),
                error: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FetchError::NetworkError {
                url: url.to_string(),
                error: format!("HTTP {}", response.status()),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::IoError {
                    path: parent.to_path_buf(),
                    error: e.to_string(),
                })?;
        }

        let mut file = File::create(dest).await.map_err(|e| FetchError::IoError {
            path: dest.to_path_buf(),
            error: e.to_string(),
        })?;

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| FetchError::NetworkError {
                url: url.to_string(),
                error: e.to_string(),
            })?;

            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::IoError {
                    path: dest.to_path_buf(),
                    error: e.to_string(),
                })?;
            downloaded += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| FetchError::IoError {
            path: dest.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(DownloadResult {
            path: dest.to_path_buf(),
            size: downloaded,
        })
    }
}

impl Default for DownloadManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Hex digest of `path` using the algorithm of `checksum`
pub fn compute_file_checksum(path: &Path, checksum: &Checksum) -> Result<String, FetchError> {
    let content = std::fs::read(path).map_err(|e| FetchError::IoError {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    let mut hasher = Hasher::for_checksum(checksum);
    hasher.update(&content);
    Ok(hasher.finalize_hex())
}

/// Fail with [`FetchError::ChecksumMismatch`] unless `path` matches
pub fn verify_checksum(path: &Path, expected: &Checksum) -> Result<(), FetchError> {
    let actual = compute_file_checksum(path, expected)?;
    if actual == expected.hex() {
        Ok(())
    } else {
        Err(FetchError::ChecksumMismatch {
            file: path.display().to_string(),
            expected: expected.to_string(),
            actual: format!("{}:{actual}", expected.algorithm()),
        })
    }
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Acquires a recipe's source archive into a local file
pub trait SourceFetcher {
    /// Path of a verified local copy of `source`
    fn fetch(&self, source: &ResolvedSource) -> Result<PathBuf, FetchError>;
}

/// Fetcher backed by a download cache directory
///
/// `http(s)://` URLs go through [`DownloadManager`]; `file://` URLs and
/// plain paths are copied. A fetched archive gets a sibling marker file
/// naming its URL and checksum. Later sessions reuse it when the checksum
/// still matches, or, for unverified sources, when the URL is the same.
#[derive(Debug)]
pub struct HttpFetcher {
    cache_dir: PathBuf,
    manager: DownloadManager,
    runtime: tokio::runtime::Runtime,
}

impl HttpFetcher {
    pub fn new(cache_dir: PathBuf) -> Result<Self, FetchError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| FetchError::IoError {
                path: cache_dir.clone(),
                error: e.to_string(),
            })?;
        Ok(Self {
            cache_dir,
            manager: DownloadManager::new(),
            runtime,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cache location of an archive
    pub fn cached_path(&self, source: &ResolvedSource) -> PathBuf {
        self.cache_dir.join(&source.file_name)
    }

    fn marker_path(archive: &Path) -> PathBuf {
        let mut name = archive.as_os_str().to_owned();
        name.push(defaults::FETCHED_MARKER_SUFFIX);
        PathBuf::from(name)
    }

    fn is_cached(&self, archive: &Path, source: &ResolvedSource) -> bool {
        if !archive.is_file() {
            return false;
        }
        let Ok(marker) = std::fs::read_to_string(Self::marker_path(archive)) else {
            return false;
        };
        match &source.checksum {
            Some(checksum) => verify_checksum(archive, checksum).is_ok(),
            None => marker.lines().next() == Some(source.url.as_str()),
        }
    }

    fn acquire(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            self.runtime.block_on(self.manager.download(url, dest))?;
            return Ok(());
        }

        let local = url.strip_prefix("file://").unwrap_or(url);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FetchError::IoError {
                path: parent.to_path_buf(),
                error: e.to_string(),
            })?;
        }
        std::fs::copy(local, dest).map_err(|e| FetchError::NetworkError {
            url: url.to_string(),
            error: e.to_string(),
        })?;
        Ok(())
    }
}

impl SourceFetcher for HttpFetcher {
    fn fetch(&self, source: &ResolvedSource) -> Result<PathBuf, FetchError> {
        let archive = self.cached_path(source);
        if self.is_cached(&archive, source) {
            tracing::debug!("Using cached {}", archive.display());
            return Ok(archive);
        }

        tracing::info!("Downloading {}", source.url);
        self.acquire(&source.url, &archive)?;

        match &source.checksum {
            Some(checksum) => {
                if let Err(e) = verify_checksum(&archive, checksum) {
                    let _ = std::fs::remove_file(&archive);
                    return Err(e);
                }
            }
            None => tracing::warn!("No checksum declared for {}; archive is unverified", source.url),
        }

        let marker = format!(
            "{}\n{}\n",
            source.url,
            source
                .checksum
                .as_ref()
                .map_or_else(|| "unverified".to_string(), ToString::to_string)
        );
        std::fs::write(Self::marker_path(&archive), marker).map_err(|e| FetchError::IoError {
            path: archive.clone(),
            error: e.to_string(),
        })?;

        Ok(archive)
    }
}
