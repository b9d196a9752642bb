//! # Policies for the remote bus connection.
//!
//! - [`ReconnectPolicy`] delay between reconnect attempts
//! - [`JitterPolicy`] randomization of those delays

mod jitter;
mod reconnect;

pub use jitter::JitterPolicy;
pub use reconnect::ReconnectPolicy;
