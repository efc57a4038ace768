mod event;
mod principal;
pub use event::*;
pub use principal::*;
