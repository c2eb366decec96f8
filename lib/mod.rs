// slogd: composition of the local log collector
// Wires the datagram listener, header parser, sink fanout and frequency table
// into one receive loop, plus the process-level pieces around it
// (configuration, detachment, interrupt handling, pid file).

// Re-export the building blocks
pub use slogd_core::*;
pub use slogd_fanout::*;
pub use slogd_transport::*;

pub mod collector;
pub mod config;
pub mod detach;
pub mod pidfile;
pub mod signal;

pub use collector::{Collector, CollectorError, StopReason};
pub use config::Config;
pub use detach::{Detach, DetachError};
pub use pidfile::{PidFile, PidFileError};
pub use signal::{ShutdownController, SignalError};
