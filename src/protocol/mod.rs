//! VCM protocol implementation
//!
//! This module defines the wire format, encoding/decoding, and the
//! finite-state responder that reproduces the VCM's observed behavior.

pub mod codec;
pub mod message;
pub mod state;

pub use self::codec::VcmCodec;
pub use self::message::{Message, Role, ACK_DATA};
pub use self::state::{ProtocolConfig, StatusSnapshot, VcmState, VcmStateMachine};
