// Cancellation token shared between the receive loop and whatever stops it
use std::io::Result;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixDatagram;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    // cancel() writes one byte here so a poller on wake_rx returns
    wake_tx: UnixDatagram,
    wake_rx: UnixDatagram,
}

/// One-way shutdown flag: starts clear, set once by `cancel`, never reset.
///
/// Besides the flag the token owns a socket pair. `cancel` writes a byte to
/// it, which makes [`ShutdownToken::wake_fd`] readable; blocking receivers
/// poll that descriptor next to their own socket and return promptly.
/// `cancel` is async-signal-safe: one atomic swap and one non-blocking `send`.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

impl ShutdownToken {
    pub fn new() -> Result<Self> {
        let (wake_tx, wake_rx) = UnixDatagram::pair()?;
        wake_tx.set_nonblocking(true)?;
        Ok(ShutdownToken {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                wake_tx,
                wake_rx,
            }),
        })
    }

    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            let _ = self.inner.wake_tx.send(&[1]);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Readable once the token has been cancelled.
    pub fn wake_fd(&self) -> BorrowedFd<'_> {
        self.inner.wake_rx.as_fd()
    }
}
