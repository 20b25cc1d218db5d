use std::net::ToSocketAddrs;
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use super::device::AcsDevice;
use super::errors::{AcsError, AcsResult};
use crate::{Axis, MotionInterface};

/// `?MST` status word bits.
const MST_ENABLED: u32 = 1 << 0;
const MST_IN_POSITION: u32 = 1 << 4;
const MST_MOVING: u32 = 1 << 5;

const MOTION_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Decoded `?MST` motor status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorState {
    pub enabled: bool,
    pub moving: bool,
    pub in_position: bool,
}

impl MotorState {
    fn from_word(word: u32) -> Self {
        MotorState {
            enabled: word & MST_ENABLED != 0,
            moving: word & MST_MOVING != 0,
            in_position: word & MST_IN_POSITION != 0,
        }
    }
}

/// Motion command set of the four-axis stage controller.
pub struct AcsController {
    device: AcsDevice,
}

impl AcsController {
    pub fn connect<A: ToSocketAddrs + ToString>(address: A) -> AcsResult<Self> {
        Ok(AcsController {
            device: AcsDevice::connect(address)?,
        })
    }

    pub fn connect_ip(ip: &str) -> AcsResult<Self> {
        Ok(AcsController {
            device: AcsDevice::connect_ip(ip)?,
        })
    }

    pub fn reconnect(&mut self) -> AcsResult<()> {
        self.device.reconnect()
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> AcsResult<()> {
        self.device.set_timeout(timeout)
    }

    pub fn enable(&mut self, axis: Axis) -> AcsResult<()> {
        self.device.command(&format!("ENABLE {axis}"))
    }

    pub fn disable(&mut self, axis: Axis) -> AcsResult<()> {
        self.device.command(&format!("DISABLE {axis}"))
    }

    /// Point-to-point velocity in mm/s.
    pub fn set_velocity(&mut self, axis: Axis, mm_per_s: f64) -> AcsResult<()> {
        if !(mm_per_s.is_finite() && mm_per_s > 0.0) {
            return Err(AcsError::InvalidArgument(format!(
                "velocity must be positive and finite, got {mm_per_s}"
            )));
        }
        self.device.command(&format!("VEL({axis})={mm_per_s}"))
    }

    /// Feedback position in mm.
    pub fn position(&mut self, axis: Axis) -> AcsResult<f64> {
        let reply = self.device.query(&format!("?FPOS({axis})"))?;
        AcsDevice::parse_single_value(&reply)
    }

    pub fn motor_state(&mut self, axis: Axis) -> AcsResult<MotorState> {
        let reply = self.device.query(&format!("?MST({axis})"))?;
        let word = reply
            .trim()
            .parse()
            .map_err(|_| AcsError::Parse(format!("expected a status word, got '{reply}'")))?;
        Ok(MotorState::from_word(word))
    }

    /// Start a relative point-to-point move of several axes at once.
    pub fn move_relative(&mut self, axes: &[Axis], deltas_mm: &[f64]) -> AcsResult<()> {
        if axes.is_empty() || axes.len() != deltas_mm.len() {
            return Err(AcsError::InvalidArgument(format!(
                "{} axes with {} deltas",
                axes.len(),
                deltas_mm.len()
            )));
        }
        let axis_list = axes
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let delta_list = deltas_mm
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.device
            .command(&format!("PTP/r ({axis_list}), {delta_list}"))
    }

    /// Stop every axis immediately.
    pub fn kill_all(&mut self) -> AcsResult<()> {
        warn!("killing all axes");
        self.device.command("KILLALL")
    }

    /// Poll `?MST` until the axis reports in-position. Returns `Ok(false)`
    /// if the timeout expires first; the axis is left as-is.
    pub fn wait_motion_end(&mut self, axis: Axis, timeout: Duration) -> AcsResult<bool> {
        let start = Instant::now();
        loop {
            if self.motor_state(axis)?.in_position {
                return Ok(true);
            }
            if start.elapsed() > timeout {
                warn!("axis {axis} did not reach position within {timeout:?}");
                return Ok(false);
            }
            thread::sleep(MOTION_POLL_INTERVAL);
        }
    }
}

impl MotionInterface for AcsController {
    fn enable(&mut self, axis: Axis) -> Result<(), String> {
        AcsController::enable(self, axis).map_err(|e| format!("enable axis {axis}: {e}"))
    }

    fn disable(&mut self, axis: Axis) -> Result<(), String> {
        AcsController::disable(self, axis).map_err(|e| format!("disable axis {axis}: {e}"))
    }

    fn set_velocity(&mut self, axis: Axis, mm_per_s: f64) -> Result<(), String> {
        AcsController::set_velocity(self, axis, mm_per_s)
            .map_err(|e| format!("set velocity of axis {axis}: {e}"))
    }

    fn position(&mut self, axis: Axis) -> Result<f64, String> {
        AcsController::position(self, axis).map_err(|e| format!("read axis {axis} position: {e}"))
    }

    fn move_relative(&mut self, axes: &[Axis], deltas_mm: &[f64]) -> Result<(), String> {
        AcsController::move_relative(self, axes, deltas_mm)
            .map_err(|e| format!("relative move: {e}"))
    }

    fn wait_motion_end(&mut self, axis: Axis, timeout: Duration) -> Result<bool, String> {
        AcsController::wait_motion_end(self, axis, timeout)
            .map_err(|e| format!("wait for axis {axis}: {e}"))
    }

    fn in_position(&mut self, axis: Axis) -> Result<bool, String> {
        self.motor_state(axis)
            .map(|s| s.in_position)
            .map_err(|e| format!("read axis {axis} state: {e}"))
    }

    fn kill_all(&mut self) -> Result<(), String> {
        AcsController::kill_all(self).map_err(|e| format!("kill all axes: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motor_state_bits_decode() {
        let state = MotorState::from_word(MST_ENABLED | MST_IN_POSITION);
        assert!(state.enabled);
        assert!(state.in_position);
        assert!(!state.moving);

        let state = MotorState::from_word(MST_ENABLED | MST_MOVING);
        assert!(state.moving);
        assert!(!state.in_position);
    }
}
