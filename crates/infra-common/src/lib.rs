//! Shared event infrastructure for the hwlink stack.
//!
//! This crate is deliberately small: it provides the generic [`EventBus`]
//! and the [`Event`] trait consumed by the core crates. Event *definitions*
//! live with the components that emit them.

pub mod events;

pub use events::{Event, EventBus, Subscription};
