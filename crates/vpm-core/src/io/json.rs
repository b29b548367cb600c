//! Reading and writing the JSON files this crate owns.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs;
use vpm_schema::strip_bom_bytes;

/// Failure reading or writing a JSON file.
#[derive(Error, Debug)]
pub enum JsonFileError {
    /// The file could not be read or written.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The content did not match the expected shape.
    #[error("JSON error on {}: {source}", path.display())]
    Parse {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl JsonFileError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads and parses `path`, returning `None` when the file does not exist.
///
/// # Errors
///
/// [`JsonFileError::Io`] for any other read failure, [`JsonFileError::Parse`]
/// when the content does not deserialize into `T`.
pub async fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, JsonFileError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(JsonFileError::io(path, e)),
    };
    serde_json::from_slice(strip_bom_bytes(&bytes))
        .map(Some)
        .map_err(|source| JsonFileError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Pretty-prints `value` to `path`, creating parent directories.
///
/// The file is written next to its destination and renamed into place so a
/// reader never observes a partial file.
///
/// # Errors
///
/// Fails when `value` cannot be serialized or the file cannot be written.
pub async fn write_json_file<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), JsonFileError> {
    let mut content = serde_json::to_vec_pretty(value).map_err(|source| JsonFileError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    content.push(b'\n');

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| JsonFileError::io(parent, e))?;
    }

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &content)
        .await
        .map_err(|e| JsonFileError::io(&temp_path, e))?;
    fs::rename(&temp_path, path)
        .await
        .map_err(|e| JsonFileError::io(path, e))?;
    Ok(())
}
