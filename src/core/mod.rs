//! Core types shared across the simulator
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod serde;
pub mod types;

pub use self::error::{Error, Result};
pub use self::types::Config;

/// Default UDP port for the VCM protocol
pub const DEFAULT_PORT: u16 = 50000;

/// Address the IHU peer is expected at when none has been observed
pub const DEFAULT_PEER_IP: &str = "198.18.34.1";

/// Maximum datagram size in bytes
pub const MAX_PACKET_SIZE: usize = 1024;
