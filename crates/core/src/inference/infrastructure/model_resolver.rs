use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("model '{0}' not found (not a file, not cached, and no download URL given)")]
    NotFound(String),
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download failed for {url}: HTTP {status}")]
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

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Resolve a model argument to a file on disk.
///
/// Resolution order:
/// 1. `model` as given, if it names an existing file
/// 2. `model`'s file name inside the user cache directory
/// 3. Download `{base_url}/{file name}` into the cache
pub fn resolve(
    model: &str,
    base_url: Option<&str>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    if Path::new(model).is_file() {
        return Ok(PathBuf::from(model));
    }
    resolve_in(model, &model_cache_dir()?, base_url, progress)
}

fn resolve_in(
    model: &str,
    cache_dir: &Path,
    base_url: Option<&str>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let direct = Path::new(model);
    if direct.is_file() {
        return Ok(direct.to_path_buf());
    }

    let name = direct
        .file_name()
        .ok_or_else(|| ModelResolveError::NotFound(model.to_string()))?;
    let cached_path = cache_dir.join(name);
    if cached_path.is_file() {
        log::debug!("Using cached model {}", cached_path.display());
        return Ok(cached_path);
    }

    let Some(base_url) = base_url else {
        return Err(ModelResolveError::NotFound(model.to_string()));
    };
    let url = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        name.to_string_lossy()
    );

    fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
    log::info!("Downloading {url}");
    download(&url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/Gaze Pointer/models/`
/// - Linux: `$XDG_CACHE_HOME/Gaze Pointer/models/` or `~/.cache/Gaze Pointer/models/`
/// - Windows: `%LOCALAPPDATA%/Gaze Pointer/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("Gaze Pointer").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("Gaze Pointer").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let download_err = |source| ModelResolveError::Download {
        url: url.to_string(),
        source,
    };
    let response = reqwest::blocking::get(url).map_err(download_err)?;
    if !response.status().is_success() {
        return Err(ModelResolveError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let total = response.content_length().unwrap_or(0);
    let bytes = response.bytes().map_err(download_err)?;

    // Written under .part and renamed, so a failed download never leaves
    // a truncated model behind.
    let temp_path = dest.with_extension("part");
    let write_err = |source| ModelResolveError::Write {
        path: temp_path.clone(),
        source,
    };
    let mut file = fs::File::create(&temp_path).map_err(write_err)?;

    let mut downloaded: u64 = 0;
    for chunk in bytes.chunks(1024 * 1024) {
        file.write_all(chunk).map_err(write_err)?;
        downloaded += chunk.len() as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }
    file.flush().map_err(write_err)?;
    drop(file);

    fs::rename(&temp_path, dest).map_err(|source| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source,
    })?;
    Ok(())
}
