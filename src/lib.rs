//! VCM Simulator: emulates the network-visible behavior of an automotive
//! head-unit controller over its proprietary UDP protocol.
//!
//! The protocol engine reproduces the request/response/broadcast sequencing
//! observed in packet captures of a real VCM talking to an in-vehicle
//! display unit (IHU): acknowledgment suppression, the multi-step setup
//! handshake, and timed status broadcasts.

pub mod core;
pub mod network;
pub mod protocol;

// Re-export commonly used items
pub use self::core::{Config, Error, Result};
pub use self::network::{Simulator, SimulatorHandle};
pub use self::protocol::{Message, VcmState, VcmStateMachine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
