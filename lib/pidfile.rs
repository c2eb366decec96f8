// Pid file for a detached daemon, removed again on clean shutdown
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
#[error("could not write pid file {path:?}: {source}")]
pub struct PidFileError {
    pub path: PathBuf,
    pub source: io::Error,
}

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, PidFileError> {
        let path = path.as_ref().to_path_buf();
        fs::write(&path, format!("{}\n", process::id())).map_err(|source| PidFileError {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), pid = process::id(), "pid file written");
        Ok(PidFile { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "could not remove pid file: {}", e),
        }
    }
}
