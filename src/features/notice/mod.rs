//! Role-scoped notice documents.
//!
//! [`process`] is a pure reducer over a [`NoticeDocument`]; [`NoticeRunner`]
//! wraps it with the load, save-if-changed and broadcast steps.

mod reducer;
mod runner;
pub use reducer::*;
pub use runner::*;

#[cfg(test)]
mod runner_test;
