//! Event bus primitives.
//!
//! The bus is an explicit object: components that need one construct it and
//! pass it down. There is no process-global default instance, so two engine
//! instances (or two test runs in one process) never share subscriber state.

mod bus;
mod types;

pub use bus::{EventBus, Subscription};
pub use types::Event;
