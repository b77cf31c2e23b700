use std::fmt;

/// Trait implemented by every event type carried on an [`EventBus`].
///
/// [`EventBus`]: crate::events::EventBus
pub trait Event: Clone + Send + Sync + fmt::Debug + 'static {
    /// Stable tag identifying the event variant (e.g. `"call-response"`).
    ///
    /// Used for logging and for subscribers that dispatch on the tag rather
    /// than matching the enum directly.
    fn event_type(&self) -> &'static str;
}
