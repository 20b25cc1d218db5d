//! Driver for an ACS SPiiPlus-family motion controller.
//!
//! The controller speaks a line-oriented ASCII protocol over TCP: commands
//! are terminated with a carriage return, queries are prefixed with `?`, and
//! the controller answers every line — with a value for queries, a bare
//! prompt for accepted commands, or `?<code>` when the command was rejected.
//!
//! [`AcsDevice`] owns the transport and the reply framing; [`AcsController`]
//! layers the motion command set on top of it and implements
//! [`crate::MotionInterface`].

mod controller;
mod device;
mod errors;

pub use controller::{AcsController, MotorState};
pub use device::{AcsDevice, DEFAULT_PORT};
pub use errors::{AcsError, AcsResult};

/// Controller address on the bench network.
pub const DEFAULT_CONTROLLER_IP: &str = "10.0.0.100";
