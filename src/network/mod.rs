//! UDP transport for the VCM simulator
//!
//! This module binds the protocol engine to a UDP endpoint and drives its
//! periodic tick.

mod simulator;

pub use self::simulator::{Simulator, SimulatorHandle};
