use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

const APP_DIR: &str = "Proctor";
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Where a model file may live before it has to be downloaded.
#[derive(Clone, Debug, Default)]
pub struct ModelLocation {
    pub name: String,
    pub url: String,
    /// Directory shipped alongside the binary, checked after the user cache.
    pub bundled_dir: Option<PathBuf>,
}

impl ModelLocation {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            bundled_dir: None,
        }
    }

    pub fn with_bundled_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.bundled_dir = dir;
        self
    }
}

/// Resolve a model file, checking the user cache and bundled directory
/// before downloading into the cache.
pub fn resolve(location: &ModelLocation) -> Result<PathBuf, ModelResolveError> {
    resolve_in(&model_cache_dir()?, location)
}

/// Resolution against an explicit cache directory.
///
/// Order: cache dir, bundled dir, download to cache dir.
pub fn resolve_in(
    cache_dir: &Path,
    location: &ModelLocation,
) -> Result<PathBuf, ModelResolveError> {
    let cached_path = cache_dir.join(&location.name);
    if cached_path.exists() {
        return Ok(cached_path);
    }

    if let Some(dir) = &location.bundled_dir {
        let bundled_path = dir.join(&location.name);
        if bundled_path.exists() {
            return Ok(bundled_path);
        }
    }

    fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
    log::info!("Downloading model {} from {}", location.name, location.url);
    download(&location.url, &cached_path)?;
    Ok(cached_path)
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/Proctor/models/`
/// - Linux: `$XDG_CACHE_HOME/Proctor/models/` or `~/.cache/Proctor/models/`
/// - Windows: `%LOCALAPPDATA%/Proctor/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR).join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join(APP_DIR).join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path) -> Result<(), ModelResolveError> {
    let download_err = |e: reqwest::Error| ModelResolveError::Download {
        url: url.to_string(),
        source: e,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(download_err)?;
    let bytes = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.bytes())
        .map_err(download_err)?;

    // Write to a temp file first, then rename so a failed download never
    // leaves a truncated model in the cache.
    let temp_path = dest.with_extension("part");
    let write_err = |path: &Path, e: std::io::Error| ModelResolveError::Write {
        path: path.to_path_buf(),
        source: e,
    };
    let mut file = fs::File::create(&temp_path).map_err(|e| write_err(&temp_path, e))?;
    file.write_all(&bytes).map_err(|e| write_err(&temp_path, e))?;
    file.flush().map_err(|e| write_err(&temp_path, e))?;
    drop(file);

    fs::rename(&temp_path, dest).map_err(|e| write_err(dest, e))?;
    Ok(())
}
