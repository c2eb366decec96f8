// Transport module: local datagram endpoint and cooperative cancellation
pub mod traits;
pub mod cancel;
pub mod unix;

pub use traits::*;
pub use cancel::*;
pub use unix::*;
