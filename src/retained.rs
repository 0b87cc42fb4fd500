//! State that survives deep sleep.
//!
//! Only the whitelist entries and the latest reading live here. Everything
//! else (device mode, discovery parameters, the whitelist's initialised flag)
//! is rebuilt on every wake, so the gateway can never come back up stuck in
//! registration or deletion.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::ReadingCache;
use crate::whitelist::{Whitelist, WhitelistError};

#[derive(Error, Debug)]
pub enum RetainedError {
    #[error("failed to access retained region {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("retained region is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("retained whitelist is inconsistent: {0}")]
    Invalid(#[from] WhitelistError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetainedState {
    pub whitelist: Whitelist,
    pub reading: ReadingCache,
}

/// Backing storage for the retained region.
pub trait RetainedStore {
    /// `None` after a full power loss (nothing retained yet).
    fn load(&self) -> Result<Option<RetainedState>, RetainedError>;

    fn store(&mut self, state: &RetainedState) -> Result<(), RetainedError>;

    /// Drops the retained image, as a full power loss would.
    fn clear(&mut self) -> Result<(), RetainedError>;
}

fn validated(state: RetainedState) -> Result<RetainedState, RetainedError> {
    state.whitelist.validate()?;
    Ok(state)
}

/// Keeps the retained image as JSON on disk between process runs.
#[derive(Debug, Clone)]
pub struct FileRetainedStore {
    path: PathBuf,
}

impl FileRetainedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> RetainedError {
        RetainedError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl RetainedStore for FileRetainedStore {
    fn load(&self) -> Result<Option<RetainedState>, RetainedError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };
        let state: RetainedState = serde_json::from_str(&contents)?;
        debug!("Loaded retained region from {}", self.path.display());
        validated(state).map(Some)
    }

    fn store(&mut self, state: &RetainedState) -> Result<(), RetainedError> {
        let contents = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, contents).map_err(|err| self.io_error(err))?;
        debug!("Stored retained region to {}", self.path.display());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), RetainedError> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(self.io_error(err)),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRetainedStore {
    image: Option<RetainedState>,
}

impl RetainedStore for MemoryRetainedStore {
    fn load(&self) -> Result<Option<RetainedState>, RetainedError> {
        self.image.clone().map(validated).transpose()
    }

    fn store(&mut self, state: &RetainedState) -> Result<(), RetainedError> {
        self.image = Some(state.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), RetainedError> {
        self.image = None;
        Ok(())
    }
}
