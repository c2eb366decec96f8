// Datagram source abstraction - lets the collector run against any endpoint
use crate::cancel::ShutdownToken;
use std::io::Result;

/// Outcome of one blocking receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Raw datagram bytes, already capped at the receive buffer size.
    Datagram(Vec<u8>),
    /// The shutdown token was cancelled before or during the wait.
    Interrupted,
    /// The source has nothing more to deliver.
    Closed,
}

pub trait DatagramSource: Send {
    /// Block until a datagram arrives or `shutdown` is cancelled. No timeout.
    fn receive(&mut self, shutdown: &ShutdownToken) -> Result<Received>;
    /// Release the endpoint. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
}
