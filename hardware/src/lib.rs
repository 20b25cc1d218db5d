//! Instrument drivers for the stretched-wire magnetic measurement bench.
//!
//! The bench is a four-axis motion stage carrying a stretched wire through the
//! field of a magnet under test, with a nanovoltmeter reading the voltage
//! induced on the wire. This crate provides the drivers for the real
//! instruments (an ACS SPiiPlus-style motion controller and a Keithley 2182A
//! nanovoltmeter), a deterministic simulator for tests, and the capability
//! traits the measurement logic is written against.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::Args;
use serde::Serialize;

pub mod acs;
pub mod keithley;
pub mod sim;

pub use acs::AcsController;
pub use keithley::Keithley2182a;

/// One of the four stage axes, numbered as the motion controller numbers them.
///
/// Axes 1 and 3 move the wire ends horizontally, axes 0 and 2 vertically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Axis {
    Axis0,
    Axis1,
    Axis2,
    Axis3,
}

impl Axis {
    pub const ALL: [Axis; 4] = [Axis::Axis0, Axis::Axis1, Axis::Axis2, Axis::Axis3];

    /// Zero-based controller index of this axis.
    pub fn index(self) -> usize {
        match self {
            Axis::Axis0 => 0,
            Axis::Axis1 => 1,
            Axis::Axis2 => 2,
            Axis::Axis3 => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Axis> {
        Axis::ALL.get(index).copied()
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(Axis::Axis0),
            "1" => Ok(Axis::Axis1),
            "2" => Ok(Axis::Axis2),
            "3" => Ok(Axis::Axis3),
            other => Err(format!("invalid axis '{other}', expected 0-3")),
        }
    }
}

/// A pair of axes that move one transverse coordinate of the wire.
///
/// The first member of each pair is the master: scans command both members but
/// sample and wait on the master only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AxisPair {
    /// Horizontal pair, axes 1 and 3.
    X,
    /// Vertical pair, axes 0 and 2.
    Y,
}

impl AxisPair {
    /// Both members, master first.
    pub fn axes(self) -> [Axis; 2] {
        match self {
            AxisPair::X => [Axis::Axis1, Axis::Axis3],
            AxisPair::Y => [Axis::Axis0, Axis::Axis2],
        }
    }

    pub fn master(self) -> Axis {
        self.axes()[0]
    }

    pub fn slave(self) -> Axis {
        self.axes()[1]
    }
}

impl fmt::Display for AxisPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisPair::X => write!(f, "X"),
            AxisPair::Y => write!(f, "Y"),
        }
    }
}

impl FromStr for AxisPair {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "x" | "X" => Ok(AxisPair::X),
            "y" | "Y" => Ok(AxisPair::Y),
            other => Err(format!("invalid axis pair '{other}', expected X or Y")),
        }
    }
}

/// Capability contract for the four-axis motion stage.
///
/// Implemented by [`AcsController`] for the real bench and by
/// [`sim::SimMotion`] for tests. Errors cross this boundary as display
/// strings; callers wrap them into their own error types.
pub trait MotionInterface {
    fn enable(&mut self, axis: Axis) -> Result<(), String>;

    fn disable(&mut self, axis: Axis) -> Result<(), String>;

    /// Set the point-to-point velocity of an axis in mm/s.
    fn set_velocity(&mut self, axis: Axis, mm_per_s: f64) -> Result<(), String>;

    /// Current feedback position of an axis in mm.
    fn position(&mut self, axis: Axis) -> Result<f64, String>;

    /// Start a relative move of several axes at once. Returns as soon as the
    /// controller has accepted the command.
    fn move_relative(&mut self, axes: &[Axis], deltas_mm: &[f64]) -> Result<(), String>;

    /// Block until the axis reports in-position, or until the timeout
    /// expires. Returns `Ok(false)` on timeout.
    fn wait_motion_end(&mut self, axis: Axis, timeout: Duration) -> Result<bool, String>;

    /// Whether the axis currently reports in-position.
    fn in_position(&mut self, axis: Axis) -> Result<bool, String>;

    /// Immediately stop all axes.
    fn kill_all(&mut self) -> Result<(), String>;
}

/// Capability contract for the wire voltmeter.
pub trait VoltageInterface {
    /// One voltage reading in volts. May be NaN if the instrument reports a
    /// fault without failing the read.
    fn read_voltage(&mut self) -> Result<f64, String>;
}

/// Command-line arguments for connecting to the bench instruments.
#[derive(Args, Debug, Clone)]
pub struct BenchArgs {
    /// Motion controller IP address
    #[arg(long, default_value = acs::DEFAULT_CONTROLLER_IP)]
    pub controller_ip: String,

    /// Nanovoltmeter socket address (host:port)
    #[arg(long, default_value = keithley::DEFAULT_VOLTMETER_ADDR)]
    pub voltmeter_addr: String,
}

impl BenchArgs {
    pub fn connect_controller(&self) -> Result<AcsController, String> {
        AcsController::connect_ip(&self.controller_ip)
            .map_err(|e| format!("failed to connect to controller at {}: {e}", self.controller_ip))
    }

    pub fn connect_voltmeter(&self) -> Result<Keithley2182a, String> {
        Keithley2182a::connect(&self.voltmeter_addr)
            .map_err(|e| format!("failed to connect to voltmeter at {}: {e}", self.voltmeter_addr))
    }
}
