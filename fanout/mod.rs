// fanout: replicate every accepted line to the configured log sinks
use slogd_core::truncate_output;
use std::fs::File;
use std::io::{self, LineWriter, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    #[error("failed to open sink #{position} {path:?}: {source}")]
    Open {
        position: usize,
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to write to sink #{position} ({name}): {source}")]
    Write {
        position: usize,
        name: String,
        source: io::Error,
    },
    #[error("failed to close sink #{position} ({name}): {source}")]
    Close {
        position: usize,
        name: String,
        source: io::Error,
    },
}

/// One output handle and its 1-based position on the command line.
pub struct LogSink<W> {
    position: usize,
    name: String,
    writer: W,
}

impl<W> LogSink<W> {
    pub fn position(&self) -> usize {
        self.position
    }
}

/// Ordered set of sinks. Writes go out in registration order and the first
/// failure aborts the whole fanout.
pub struct Fanout<W: Write> {
    sinks: Vec<LogSink<W>>,
}

impl<W: Write> Default for Fanout<W> {
    fn default() -> Self {
        Fanout { sinks: Vec::new() }
    }
}

impl<W: Write> Fanout<W> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the next sink; its position follows the previous one.
    pub fn push(&mut self, name: impl Into<String>, writer: W) {
        let position = self.sinks.len() + 1;
        self.sinks.push(LogSink {
            position,
            name: name.into(),
            writer,
        });
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn sinks(&self) -> &[LogSink<W>] {
        &self.sinks
    }

    /// Append `message` (cut to the output limit) plus a newline to every sink.
    pub fn write(&mut self, message: &[u8]) -> Result<(), FanoutError> {
        let line = truncate_output(message);
        for sink in self.sinks.iter_mut() {
            sink.writer
                .write_all(line)
                .and_then(|_| sink.writer.write_all(b"\n"))
                .map_err(|source| FanoutError::Write {
                    position: sink.position,
                    name: sink.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Flush and release every sink in registration order.
    pub fn close(self) -> Result<(), FanoutError> {
        for mut sink in self.sinks {
            sink.writer.flush().map_err(|source| FanoutError::Close {
                position: sink.position,
                name: sink.name.clone(),
                source,
            })?;
            debug!(position = sink.position, name = %sink.name, "sink closed");
        }
        Ok(())
    }
}

/// File-backed sinks, flushed after every line.
pub type FileFanout = Fanout<LineWriter<File>>;

impl Fanout<LineWriter<File>> {
    /// Create (truncating) one file per path, in order.
    pub fn create<P: AsRef<Path>>(paths: &[P]) -> Result<Self, FanoutError> {
        let mut fanout = Fanout::new();
        for (i, path) in paths.iter().enumerate() {
            let path = path.as_ref();
            let file = File::create(path).map_err(|source| FanoutError::Open {
                position: i + 1,
                path: path.to_path_buf(),
                source,
            })?;
            fanout.push(path.display().to_string(), LineWriter::new(file));
        }
        Ok(fanout)
    }

    /// Descriptors that must survive detachment.
    pub fn raw_fds(&self) -> Vec<RawFd> {
        self.sinks
            .iter()
            .map(|sink| sink.writer.get_ref().as_raw_fd())
            .collect()
    }
}
