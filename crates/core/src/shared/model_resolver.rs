use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::{FACE_MODEL_NAME, FACE_MODEL_URL};

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
    #[error("model server returned {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Where a detection model can be found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelLocation {
    pub name: String,
    pub url: String,
    pub bundled_dir: Option<PathBuf>,
}

impl Default for ModelLocation {
    fn default() -> Self {
        Self {
            name: FACE_MODEL_NAME.to_string(),
            url: FACE_MODEL_URL.to_string(),
            bundled_dir: None,
        }
    }
}

/// Resolve a model file, checking cache locations before downloading.
///
/// Resolution order:
/// 1. User cache directory (platform-specific)
/// 2. Bundled path (for development / pre-packaged installs)
/// 3. Download from URL to cache
pub fn resolve(location: &ModelLocation) -> Result<PathBuf, ModelResolveError> {
    resolve_in(&model_cache_dir()?, location)
}

fn resolve_in(cache_dir: &Path, location: &ModelLocation) -> Result<PathBuf, ModelResolveError> {
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
    log::info!("Downloading face model from {}", location.url);
    download(&location.url, &cached_path)?;
    Ok(cached_path)
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/FaceGate/models/`
/// - Linux: `$XDG_CACHE_HOME/FaceGate/models/` or `~/.cache/FaceGate/models/`
/// - Windows: `%LOCALAPPDATA%/FaceGate/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("FaceGate").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("FaceGate").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path) -> Result<(), ModelResolveError> {
    let response = reqwest::blocking::get(url).map_err(|e| ModelResolveError::Download {
        url: url.to_string(),
        source: e,
    })?;

    if !response.status().is_success() {
        return Err(ModelResolveError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let bytes = response.bytes().map_err(|e| ModelResolveError::Download {
        url: url.to_string(),
        source: e,
    })?;

    // Write to a temp file first, then rename for atomicity
    let temp_path = dest.with_extension("part");
    let write_err = |path: &Path, e: std::io::Error| ModelResolveError::Write {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = fs::File::create(&temp_path).map_err(|e| write_err(&temp_path, e))?;
    file.write_all(&bytes)
        .and_then(|_| file.flush())
        .map_err(|e| write_err(&temp_path, e))?;
    drop(file);

    fs::rename(&temp_path, dest).map_err(|e| write_err(dest, e))?;
    log::debug!("Saved {} bytes to {}", bytes.len(), dest.display());

    Ok(())
}
