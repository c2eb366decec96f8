// Detach from the invoking terminal: fork, setsid, fork, then reset the process environment
use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::sys::stat::{umask, Mode};
use nix::unistd::{chdir, close, dup2, fork, setsid, sysconf, ForkResult, SysconfVar};
use std::fs;
use std::os::unix::io::RawFd;
use std::path::PathBuf;
use std::process;
use tracing::info;

const STDIO: [RawFd; 3] = [0, 1, 2];

// Used when the descriptor table cannot be listed and OPEN_MAX is unknown
const FALLBACK_MAX_FD: RawFd = 8192;

#[derive(Debug, thiserror::Error)]
pub enum DetachError {
    #[error("{stage}: {source}")]
    Errno { stage: &'static str, source: Errno },
    #[error("descriptor {fd} must be kept but is a standard stream")]
    StdioKept { fd: RawFd },
}

fn errno(stage: &'static str) -> impl FnOnce(Errno) -> DetachError {
    move |source| DetachError::Errno { stage, source }
}

/// Turn the current process into a background daemon.
///
/// After a successful [`Detach::detach`] the process:
/// 1. is not the process the shell started (that one exited 0),
/// 2. is in a new session without a controlling terminal,
/// 3. is not a session leader, so it can never reacquire one,
/// 4. runs in `/` with a zero umask,
/// 5. has closed every inherited descriptor except the kept ones,
/// 6. has stdin, stdout and stderr on `/dev/null`.
///
/// Must run before any thread is spawned.
#[derive(Debug, Clone)]
pub struct Detach {
    workdir: PathBuf,
    keep_fds: Vec<RawFd>,
}

impl Default for Detach {
    fn default() -> Self {
        Detach {
            workdir: PathBuf::from("/"),
            keep_fds: Vec::new(),
        }
    }
}

impl Detach {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep these descriptors open through the descriptor sweep.
    pub fn keep_all(mut self, fds: impl IntoIterator<Item = RawFd>) -> Self {
        self.keep_fds.extend(fds);
        self
    }

    /// Returns only in the final daemon process; the intermediate processes
    /// exit with status 0.
    pub fn detach(&self) -> Result<(), DetachError> {
        if let Some(&fd) = self.keep_fds.iter().find(|fd| STDIO.contains(*fd)) {
            return Err(DetachError::StdioKept { fd });
        }

        info!(workdir = %self.workdir.display(), "detaching from terminal");

        fork_and_exit_parent("failed to create child")?;
        setsid().map_err(errno("failed to become leader of new session"))?;
        // the session leader exits so we can never reacquire a terminal
        fork_and_exit_parent("failed to create grandchild")?;

        chdir(self.workdir.as_path()).map_err(errno("failed to change directory"))?;
        umask(Mode::empty());

        for fd in inherited_fds() {
            if !self.keep_fds.contains(&fd) {
                // EBADF for descriptors closed since the listing
                let _ = close(fd);
            }
        }

        let null = open("/dev/null", OFlag::O_RDWR, Mode::empty())
            .map_err(errno("failed to open /dev/null"))?;
        for fd in STDIO {
            if null != fd {
                dup2(null, fd).map_err(errno("failed to redirect standard stream"))?;
            }
        }
        if !STDIO.contains(&null) {
            // the copies on 0-2 keep /dev/null open
            let _ = close(null);
        }
        Ok(())
    }
}

fn fork_and_exit_parent(stage: &'static str) -> Result<(), DetachError> {
    // SAFETY: detach() is documented to run before any thread exists, so the
    // child is a full copy with no lock held by a vanished thread.
    match unsafe { fork() }.map_err(errno(stage))? {
        ForkResult::Parent { .. } => process::exit(0),
        ForkResult::Child => Ok(()),
    }
}

/// Open descriptors, from /proc when available, otherwise every possible one.
fn inherited_fds() -> Vec<RawFd> {
    if let Ok(entries) = fs::read_dir("/proc/self/fd") {
        // includes the directory's own descriptor, closed again by then
        return entries
            .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
            .collect();
    }
    (0..fd_limit()).collect()
}

/// Upper bound on descriptor numbers, OPEN_MAX or the fallback.
fn fd_limit() -> RawFd {
    match sysconf(SysconfVar::OPEN_MAX) {
        Ok(Some(max)) if max > 0 => RawFd::try_from(max).unwrap_or(FALLBACK_MAX_FD),
        _ => FALLBACK_MAX_FD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn refuses_to_keep_standard_streams() {
        let err = Detach::new().keep_all([1]).detach().unwrap_err();
        assert!(matches!(err, DetachError::StdioKept { fd: 1 }));
    }

    #[test]
    fn inherited_fds_lists_open_descriptors() {
        let file = File::open("/dev/null").unwrap();
        let fds = inherited_fds();
        assert!(fds.contains(&file.as_raw_fd()));
    }

    #[test]
    fn builder_collects_kept_descriptors() {
        let d = Detach::new().keep_all([7]).keep_all(Some(9));
        assert_eq!(d.keep_fds, vec![7, 9]);
        assert_eq!(d.workdir, PathBuf::from("/"));
    }

    #[test]
    fn fd_limit_covers_open_descriptors() {
        let file = File::open("/dev/null").unwrap();
        assert!(fd_limit() > file.as_raw_fd());
    }
}
