// Interrupt handling: SIGINT cancels the shutdown token, everything else is blocked
use nix::errno::Errno;
use nix::sys::signal::{sigaction, sigprocmask, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use once_cell::sync::OnceCell;
use slogd_transport::ShutdownToken;
use tracing::debug;

// The only process-wide state: where the handler finds the token to cancel.
static SIGNAL_TOKEN: OnceCell<ShutdownToken> = OnceCell::new();

extern "C" fn on_interrupt(signum: libc::c_int) {
    // async-signal context: atomic load, atomic swap, one send(2)
    if signum == libc::SIGINT {
        if let Some(token) = SIGNAL_TOKEN.get() {
            token.cancel();
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("interrupt handler is already installed")]
    AlreadyInstalled,
    #[error("{context}: {source}")]
    Errno {
        context: &'static str,
        source: Errno,
    },
}

/// Owner of the SIGINT handler for the lifetime of the process.
pub struct ShutdownController(());

impl ShutdownController {
    /// Route SIGINT to `token` and block every other signal for the calling
    /// thread. Can succeed once per process.
    pub fn install(token: ShutdownToken) -> Result<Self, SignalError> {
        SIGNAL_TOKEN
            .set(token)
            .map_err(|_| SignalError::AlreadyInstalled)?;

        let mut blocked = SigSet::all();
        blocked.remove(Signal::SIGINT);
        sigprocmask(SigmaskHow::SIG_BLOCK, Some(&blocked), None).map_err(|source| {
            SignalError::Errno {
                context: "blocking signals",
                source,
            }
        })?;

        // No SA_RESTART: a blocked poll() returns EINTR and rechecks the token
        let action = SigAction::new(SigHandler::Handler(on_interrupt), SaFlags::empty(), blocked);
        // SAFETY: the handler only touches an initialised OnceCell and the
        // token's atomic flag and non-blocking wake socket.
        unsafe { sigaction(Signal::SIGINT, &action) }.map_err(|source| SignalError::Errno {
            context: "installing SIGINT handler",
            source,
        })?;

        debug!("SIGINT handler installed, other signals blocked");
        Ok(ShutdownController(()))
    }
}
