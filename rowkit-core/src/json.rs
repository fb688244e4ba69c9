//! File-backed key-value repository.
//!
//! Persists JSON-compatible values under named files in one directory.
//! Writes are atomic (temp file + rename); concurrent writers to the same
//! file are not coordinated.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::debug;

use crate::error::{Result, RowError};

/// Repository of JSON documents, one file per name.
#[derive(Debug, Clone)]
pub struct JsonFileRepo {
    directory: PathBuf,
}

impl JsonFileRepo {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    /// Load and parse the named file.
    ///
    /// Fails with [`RowError::NotFound`] when the file is absent.
    pub async fn read<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.path_for(name);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(RowError::not_found(path));
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&bytes).map_err(|err| RowError::json(path, err))
    }

    /// Serialize `value` and atomically overwrite the named file.
    pub async fn write<T: Serialize + ?Sized>(&self, value: &T, name: &str) -> Result<()> {
        let path = self.path_for(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let bytes =
            serde_json::to_vec(value).map_err(|err| RowError::json(path.clone(), err))?;

        let mut tmp_name = OsString::from(path.as_os_str());
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), "wrote json document");
        Ok(())
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        Ok(fs::try_exists(self.path_for(name)).await?)
    }

    /// Read the named file, or persist `default_fn`'s value when absent.
    ///
    /// Returns the value together with an existence flag: `true` when the
    /// file was already there, `false` when the default was written. The
    /// factory runs only on the absent path; an existing file is never
    /// overwritten here.
    pub async fn read_or_write_default<T, F>(&self, name: &str, default_fn: F) -> Result<(T, bool)>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        match self.read(name).await {
            Ok(value) => Ok((value, true)),
            Err(RowError::NotFound { .. }) => {
                let value = default_fn();
                self.write(&value, name).await?;
                Ok((value, false))
            }
            Err(err) => Err(err),
        }
    }
}
