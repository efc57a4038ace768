mod channel;
pub mod config;
mod constants;
mod errors;
pub mod features;
mod handler;
mod hub;
mod leader;
mod metrics;
mod model;
mod node;
pub mod plugin;
mod registry;
mod service;
mod storage;
pub mod stream;
pub mod utils;

pub use channel::*;
pub use self::config::*;
pub use constants::*;
pub use errors::*;
pub use handler::*;
pub use hub::*;
pub use leader::*;
pub use metrics::*;
pub use model::*;
pub use node::*;
pub use registry::*;
pub use service::*;
pub use storage::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
