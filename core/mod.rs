// Core module: frequency table, header parsing and report (NO I/O dependencies)
pub mod types;
pub mod protocol;
pub mod table;

pub use types::*;
pub use protocol::*;
pub use table::*;
