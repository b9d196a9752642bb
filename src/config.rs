//! # Bus configuration.
//!
//! [`BusConfig`] holds the wire names and reconnect behavior of a
//! [`RemoteEventBus`](crate::RemoteEventBus).
//!
//! ## Sentinel values
//! - `max_reconnect_attempts = 0` → retry forever
//!
//! # Example
//! ```
//! use relaybus::BusConfig;
//!
//! let mut cfg = BusConfig::default();
//! cfg.exchange = "orders".into();
//! cfg.max_reconnect_attempts = 5;
//!
//! assert_eq!(cfg.reconnect_limit(), Some(5));
//! assert!(cfg.queue_name().starts_with("relaybus."));
//! ```

use crate::policies::ReconnectPolicy;

/// Configuration of a remote bus instance.
///
/// ## Field semantics
/// - `exchange`: direct exchange shared by every instance that should see the same events
/// - `queue_prefix`: prefix of the private inbound queue (`<prefix>.<uuid>`)
/// - `reconnect`: delay between reconnect attempts
/// - `max_reconnect_attempts`: attempts per outage (`0` = unlimited)
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Exchange events are published to and consumed from.
    pub exchange: String,

    /// Prefix of the per-instance inbound queue name.
    pub queue_prefix: String,

    /// Backoff between reconnect attempts.
    pub reconnect: ReconnectPolicy,

    /// Reconnect attempts per outage before the bus stays faulted.
    ///
    /// - `0` = unlimited
    /// - `n > 0` = give up after `n` failed attempts
    pub max_reconnect_attempts: u32,
}

impl BusConfig {
    /// Returns the reconnect limit as an `Option` (`None` = unlimited).
    #[inline]
    pub fn reconnect_limit(&self) -> Option<u32> {
        if self.max_reconnect_attempts == 0 {
            None
        } else {
            Some(self.max_reconnect_attempts)
        }
    }

    /// Fresh, unique name for an inbound queue.
    pub fn queue_name(&self) -> String {
        format!("{}.{}", self.queue_prefix, uuid::Uuid::new_v4().simple())
    }
}

impl Default for BusConfig {
    /// Default configuration:
    ///
    /// - `exchange = "relaybus"`
    /// - `queue_prefix = "relaybus"`
    /// - `reconnect = ReconnectPolicy::default()`
    /// - `max_reconnect_attempts = 0` (unlimited)
    fn default() -> Self {
        Self {
            exchange: "relaybus".to_string(),
            queue_prefix: "relaybus".to_string(),
            reconnect: ReconnectPolicy::default(),
            max_reconnect_attempts: 0,
        }
    }
}
