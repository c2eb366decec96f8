// Unix datagram listener bound at a filesystem path (normally /dev/log)
use crate::cancel::ShutdownToken;
use crate::traits::{DatagramSource, Received};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::socket::{recv, MsgFlags};
use slogd_core::MAX_DATAGRAM_LEN;
use std::fs::{self, Permissions};
use std::io::{self, ErrorKind, Result};
use std::os::fd::AsFd;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Mode applied to the socket file so any local process can log.
pub const SOCKET_MODE: u32 = 0o666;

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("{path:?} exists and is not a socket")]
    Occupied { path: PathBuf },
    #[error("could not inspect {path:?}: {source}")]
    Inspect { path: PathBuf, source: io::Error },
    #[error("could not remove stale socket {path:?}, are you root? {source}")]
    RemoveStale { path: PathBuf, source: io::Error },
    #[error("failed to bind {path:?}, are you root? {source}")]
    Bind { path: PathBuf, source: io::Error },
    #[error("could not open up permissions on {path:?}: {source}")]
    Permissions { path: PathBuf, source: io::Error },
}

pub struct UnixDatagramListener {
    path: PathBuf,
    socket: Option<UnixDatagram>,
    buf: Vec<u8>,
}

impl UnixDatagramListener {
    /// Bind a datagram socket at `path`, replacing a stale socket left there.
    pub fn bind(path: impl AsRef<Path>) -> std::result::Result<Self, ListenerError> {
        let path = path.as_ref().to_path_buf();

        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_socket() => {
                fs::remove_file(&path).map_err(|source| ListenerError::RemoveStale {
                    path: path.clone(),
                    source,
                })?;
                debug!(path = %path.display(), "removed stale socket");
            }
            Ok(_) => return Err(ListenerError::Occupied { path }),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(ListenerError::Inspect { path, source }),
        }

        let socket = UnixDatagram::bind(&path).map_err(|source| ListenerError::Bind {
            path: path.clone(),
            source,
        })?;

        // From here on Drop cleans up the socket file
        let listener = UnixDatagramListener {
            path,
            socket: Some(socket),
            buf: vec![0u8; MAX_DATAGRAM_LEN],
        };

        fs::set_permissions(&listener.path, Permissions::from_mode(SOCKET_MODE)).map_err(
            |source| ListenerError::Permissions {
                path: listener.path.clone(),
                source,
            },
        )?;

        info!(path = %listener.path.display(), "listening for log datagrams");
        Ok(listener)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw descriptor of the bound socket, kept open across detachment.
    pub fn as_raw_fd(&self) -> Option<RawFd> {
        self.socket.as_ref().map(|s| s.as_raw_fd())
    }
}

impl DatagramSource for UnixDatagramListener {
    fn receive(&mut self, shutdown: &ShutdownToken) -> Result<Received> {
        let socket = match self.socket.as_ref() {
            Some(socket) => socket,
            None => return Ok(Received::Closed),
        };

        loop {
            if shutdown.is_cancelled() {
                return Ok(Received::Interrupted);
            }

            let ready = {
                let mut fds = [
                    PollFd::new(socket.as_fd(), PollFlags::POLLIN),
                    PollFd::new(shutdown.wake_fd(), PollFlags::POLLIN),
                ];
                match poll(&mut fds, PollTimeout::NONE) {
                    Ok(_) => {}
                    // a signal landed; the flag check above decides
                    Err(Errno::EINTR) => continue,
                    Err(e) => return Err(e.into()),
                }
                fds[0].revents().unwrap_or(PollFlags::empty())
            };

            if !ready.contains(PollFlags::POLLIN) {
                if ready.intersects(PollFlags::POLLERR | PollFlags::POLLHUP | PollFlags::POLLNVAL) {
                    return Ok(Received::Closed);
                }
                // only the wake descriptor fired
                continue;
            }

            // MSG_TRUNC makes the kernel report the full datagram length
            match recv(
                socket.as_raw_fd(),
                &mut self.buf,
                MsgFlags::MSG_TRUNC | MsgFlags::MSG_DONTWAIT,
            ) {
                Ok(len) => {
                    let kept = len.min(self.buf.len());
                    if len > kept {
                        debug!(len, kept, "datagram truncated");
                    }
                    return Ok(Received::Datagram(self.buf[..kept].to_vec()));
                }
                Err(Errno::EINTR) | Err(Errno::EAGAIN) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.socket.take().is_none() {
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "socket removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for UnixDatagramListener {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), "could not remove socket: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn socket_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("log.sock")
    }

    #[test]
    fn bind_creates_world_writable_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(&dir);
        let listener = UnixDatagramListener::bind(&path).unwrap();

        let meta = fs::symlink_metadata(&path).unwrap();
        assert!(meta.file_type().is_socket());
        assert_eq!(meta.permissions().mode() & 0o777, SOCKET_MODE);
        assert!(listener.as_raw_fd().is_some());
    }

    #[test]
    fn bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(&dir);
        let stale = UnixDatagram::bind(&path).unwrap();
        drop(stale);
        assert!(path.exists());

        let mut listener = UnixDatagramListener::bind(&path).unwrap();
        let token = ShutdownToken::new().unwrap();
        UnixDatagram::unbound().unwrap().send_to(b"fresh", &path).unwrap();
        assert_eq!(listener.receive(&token).unwrap(), Received::Datagram(b"fresh".to_vec()));
    }

    #[test]
    fn bind_refuses_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(&dir);
        fs::write(&path, b"not a socket").unwrap();

        match UnixDatagramListener::bind(&path) {
            Err(ListenerError::Occupied { path: p }) => assert_eq!(p, path),
            other => panic!("unexpected: {:?}", other.map(|l| l.path().to_path_buf())),
        }
        assert_eq!(fs::read(&path).unwrap(), b"not a socket");
    }

    #[test]
    fn bind_fails_in_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("log.sock");
        assert!(matches!(
            UnixDatagramListener::bind(&path),
            Err(ListenerError::Bind { .. })
        ));
    }

    #[test]
    fn receives_datagrams_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(&dir);
        let mut listener = UnixDatagramListener::bind(&path).unwrap();
        let token = ShutdownToken::new().unwrap();

        let client = UnixDatagram::unbound().unwrap();
        client.send_to(b"<13>May 14 01:42:39 a: one", &path).unwrap();
        client.send_to(b"<13>May 14 01:42:40 a: two", &path).unwrap();

        assert_eq!(
            listener.receive(&token).unwrap(),
            Received::Datagram(b"<13>May 14 01:42:39 a: one".to_vec())
        );
        assert_eq!(
            listener.receive(&token).unwrap(),
            Received::Datagram(b"<13>May 14 01:42:40 a: two".to_vec())
        );
    }

    #[test]
    fn oversized_datagram_is_cut_at_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(&dir);
        let mut listener = UnixDatagramListener::bind(&path).unwrap();
        let token = ShutdownToken::new().unwrap();

        let big = vec![b'x'; MAX_DATAGRAM_LEN + 100];
        UnixDatagram::unbound().unwrap().send_to(&big, &path).unwrap();
        UnixDatagram::unbound().unwrap().send_to(b"short", &path).unwrap();

        match listener.receive(&token).unwrap() {
            Received::Datagram(bytes) => assert_eq!(bytes.len(), MAX_DATAGRAM_LEN),
            other => panic!("unexpected {:?}", other),
        }
        // the excess must not leak into the next datagram
        assert_eq!(listener.receive(&token).unwrap(), Received::Datagram(b"short".to_vec()));
    }

    #[test]
    fn cancel_interrupts_blocked_receive() {
        let dir = tempfile::tempdir().unwrap();
        let mut listener = UnixDatagramListener::bind(socket_path(&dir)).unwrap();
        let token = ShutdownToken::new().unwrap();

        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        assert_eq!(listener.receive(&token).unwrap(), Received::Interrupted);
        handle.join().unwrap();
        // stays interrupted without blocking again
        assert_eq!(listener.receive(&token).unwrap(), Received::Interrupted);
    }

    #[test]
    fn close_removes_path_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(&dir);
        let mut listener = UnixDatagramListener::bind(&path).unwrap();

        listener.close().unwrap();
        assert!(!path.exists());
        listener.close().unwrap();

        let token = ShutdownToken::new().unwrap();
        assert_eq!(listener.receive(&token).unwrap(), Received::Closed);
    }

    #[test]
    fn close_tolerates_already_removed_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(&dir);
        let mut listener = UnixDatagramListener::bind(&path).unwrap();
        fs::remove_file(&path).unwrap();
        listener.close().unwrap();
    }

    #[test]
    fn drop_removes_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(&dir);
        drop(UnixDatagramListener::bind(&path).unwrap());
        assert!(!path.exists());
    }
}
