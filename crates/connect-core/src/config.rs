use serde::{Deserialize, Serialize};

/// Engine-level configuration.
///
/// Transport selection lives in
/// [`TransportConfig`](hwlink_device_transport::TransportConfig) and is
/// supplied per `init_transport` call; this struct configures behavior that
/// outlives any one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Overall deadline for one call, interactions included. `None`
    /// disables the deadline; the call then waits as long as the device
    /// (or the responder) takes.
    pub timeout_ms: Option<u64>,

    /// Verbose event emission: progress events on every interaction
    /// resume, payloads traced at debug level.
    pub debug: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            debug: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_deadline() {
        let config = CoreConfig::default();
        assert!(config.timeout_ms.is_none());
        assert!(!config.debug);
    }
}
