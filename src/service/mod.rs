//! Subscribe/publish entry point used by the transport layer.

mod service;
mod stats;
pub use service::*;
pub use stats::*;
