//! Deterministic in-process bench used by tests.
//!
//! Motion is kinematic with no noise: each position query advances the axis
//! toward its target by `velocity * dt` and returns the new position, so a
//! poll loop sees the same trace on every run. The wire voltage follows a
//! configurable [`FieldModel`] driven by the most recently commanded pair, so
//! the whole measurement chain can run end to end without hardware.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::{Axis, AxisPair, MotionInterface, VoltageInterface};

/// Field seen by the wire as a function of stage position.
#[derive(Debug, Clone, Copy)]
pub enum FieldModel {
    /// Voltage proportional to the distance of the commanded pair's master
    /// axis from that pair's null coordinate.
    Linear {
        x_null: f64,
        y_null: f64,
        gradient: f64,
    },
    /// Position-independent voltage.
    Constant(f64),
}

#[derive(Debug, Clone, Copy, Default)]
struct AxisState {
    position: f64,
    target: f64,
    velocity: f64,
    enabled: bool,
}

#[derive(Debug)]
struct SimState {
    axes: [AxisState; 4],
    dt: f64,
    model: FieldModel,
    active_pair: Option<AxisPair>,
    stalled: bool,
    voltage_fault: bool,
    move_count: u32,
    kill_count: u32,
}

impl SimState {
    fn advance(&mut self, axis: Axis) {
        if self.stalled {
            return;
        }
        let a = &mut self.axes[axis.index()];
        let step = a.velocity * self.dt;
        let remaining = a.target - a.position;
        if remaining.abs() <= step {
            a.position = a.target;
        } else {
            a.position += step * remaining.signum();
        }
    }
}

/// Simulated bench; hands out the motion and voltmeter endpoints and keeps a
/// handle for test inspection.
pub struct SimBench {
    state: Arc<Mutex<SimState>>,
}

impl SimBench {
    /// `dt` is the simulated time that passes per position query, in seconds.
    pub fn new(model: FieldModel, dt: f64) -> Self {
        SimBench {
            state: Arc::new(Mutex::new(SimState {
                axes: [AxisState::default(); 4],
                dt,
                model,
                active_pair: None,
                stalled: false,
                voltage_fault: false,
                move_count: 0,
                kill_count: 0,
            })),
        }
    }

    pub fn handles(&self) -> (SimMotion, SimVoltmeter) {
        (
            SimMotion {
                state: Arc::clone(&self.state),
            },
            SimVoltmeter {
                state: Arc::clone(&self.state),
            },
        )
    }

    pub fn set_position(&self, axis: Axis, position: f64) {
        let mut s = lock(&self.state);
        s.axes[axis.index()].position = position;
        s.axes[axis.index()].target = position;
    }

    pub fn positions(&self) -> [f64; 4] {
        let s = lock(&self.state);
        [
            s.axes[0].position,
            s.axes[1].position,
            s.axes[2].position,
            s.axes[3].position,
        ]
    }

    /// Freeze all motion so in-position is never reached.
    pub fn set_stalled(&self, stalled: bool) {
        lock(&self.state).stalled = stalled;
    }

    /// Make every voltage read fail.
    pub fn set_voltage_fault(&self, fault: bool) {
        lock(&self.state).voltage_fault = fault;
    }

    pub fn move_count(&self) -> u32 {
        lock(&self.state).move_count
    }

    pub fn kill_count(&self) -> u32 {
        lock(&self.state).kill_count
    }
}

/// Motion endpoint of a [`SimBench`].
pub struct SimMotion {
    state: Arc<Mutex<SimState>>,
}

/// Voltmeter endpoint of a [`SimBench`].
pub struct SimVoltmeter {
    state: Arc<Mutex<SimState>>,
}

fn lock(state: &Arc<Mutex<SimState>>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl MotionInterface for SimMotion {
    fn enable(&mut self, axis: Axis) -> Result<(), String> {
        lock(&self.state).axes[axis.index()].enabled = true;
        Ok(())
    }

    fn disable(&mut self, axis: Axis) -> Result<(), String> {
        lock(&self.state).axes[axis.index()].enabled = false;
        Ok(())
    }

    fn set_velocity(&mut self, axis: Axis, mm_per_s: f64) -> Result<(), String> {
        if !(mm_per_s.is_finite() && mm_per_s > 0.0) {
            return Err(format!("velocity must be positive, got {mm_per_s}"));
        }
        lock(&self.state).axes[axis.index()].velocity = mm_per_s;
        Ok(())
    }

    fn position(&mut self, axis: Axis) -> Result<f64, String> {
        let mut s = lock(&self.state);
        s.advance(axis);
        Ok(s.axes[axis.index()].position)
    }

    fn move_relative(&mut self, axes: &[Axis], deltas_mm: &[f64]) -> Result<(), String> {
        if axes.len() != deltas_mm.len() {
            return Err(format!(
                "{} axes with {} deltas",
                axes.len(),
                deltas_mm.len()
            ));
        }
        let mut s = lock(&self.state);
        for (axis, delta) in axes.iter().zip(deltas_mm) {
            if !s.axes[axis.index()].enabled {
                return Err(format!("axis {axis} is not enabled"));
            }
            s.axes[axis.index()].target += delta;
        }
        for pair in [AxisPair::X, AxisPair::Y] {
            if axes == pair.axes().as_slice() {
                s.active_pair = Some(pair);
            }
        }
        s.move_count += 1;
        Ok(())
    }

    fn wait_motion_end(&mut self, _axis: Axis, _timeout: Duration) -> Result<bool, String> {
        let mut s = lock(&self.state);
        if s.stalled {
            return Ok(false);
        }
        // Outstanding motion on every axis completes while we wait.
        for a in &mut s.axes {
            a.position = a.target;
        }
        Ok(true)
    }

    fn in_position(&mut self, axis: Axis) -> Result<bool, String> {
        let s = lock(&self.state);
        let a = &s.axes[axis.index()];
        Ok(!s.stalled && a.position == a.target)
    }

    fn kill_all(&mut self) -> Result<(), String> {
        let mut s = lock(&self.state);
        for a in &mut s.axes {
            a.target = a.position;
        }
        s.kill_count += 1;
        Ok(())
    }
}

impl VoltageInterface for SimVoltmeter {
    fn read_voltage(&mut self) -> Result<f64, String> {
        let s = lock(&self.state);
        if s.voltage_fault {
            return Err("simulated voltmeter fault".into());
        }
        let volts = match s.model {
            FieldModel::Constant(v) => v,
            FieldModel::Linear {
                x_null,
                y_null,
                gradient,
            } => match s.active_pair {
                Some(pair) => {
                    let null = match pair {
                        AxisPair::X => x_null,
                        AxisPair::Y => y_null,
                    };
                    gradient * (s.axes[pair.master().index()].position - null)
                }
                None => 0.0,
            },
        };
        Ok(volts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn position_advances_by_velocity_dt_per_query() {
        let bench = SimBench::new(FieldModel::Constant(0.0), 0.1);
        let (mut motion, _) = bench.handles();
        motion.enable(Axis::Axis1).unwrap();
        motion.set_velocity(Axis::Axis1, 5.0).unwrap();
        motion.move_relative(&[Axis::Axis1], &[2.0]).unwrap();

        assert_abs_diff_eq!(motion.position(Axis::Axis1).unwrap(), 0.5);
        assert_abs_diff_eq!(motion.position(Axis::Axis1).unwrap(), 1.0);
        assert!(!motion.in_position(Axis::Axis1).unwrap());

        assert!(motion.wait_motion_end(Axis::Axis1, Duration::from_secs(1)).unwrap());
        assert_abs_diff_eq!(motion.position(Axis::Axis1).unwrap(), 2.0);
        assert!(motion.in_position(Axis::Axis1).unwrap());
    }

    #[test]
    fn kill_all_freezes_outstanding_motion() {
        let bench = SimBench::new(FieldModel::Constant(0.0), 0.1);
        let (mut motion, _) = bench.handles();
        motion.enable(Axis::Axis0).unwrap();
        motion.set_velocity(Axis::Axis0, 10.0).unwrap();
        motion.move_relative(&[Axis::Axis0], &[5.0]).unwrap();
        let here = motion.position(Axis::Axis0).unwrap();

        motion.kill_all().unwrap();
        assert_eq!(motion.position(Axis::Axis0).unwrap(), here);
        assert_eq!(bench.kill_count(), 1);
    }

    #[test]
    fn linear_field_crosses_zero_at_the_null() {
        let bench = SimBench::new(
            FieldModel::Linear {
                x_null: 1.5,
                y_null: 0.0,
                gradient: 2.0,
            },
            0.1,
        );
        let (mut motion, mut meter) = bench.handles();
        for axis in AxisPair::X.axes() {
            motion.enable(axis).unwrap();
            motion.set_velocity(axis, 1.0).unwrap();
        }
        motion.move_relative(&AxisPair::X.axes(), &[1.5, 1.5]).unwrap();
        motion
            .wait_motion_end(AxisPair::X.master(), Duration::from_secs(1))
            .unwrap();
        assert_abs_diff_eq!(meter.read_voltage().unwrap(), 0.0);

        bench.set_position(AxisPair::X.master(), 2.0);
        assert_abs_diff_eq!(meter.read_voltage().unwrap(), 1.0);
    }

    #[test]
    fn stalled_axes_never_settle() {
        let bench = SimBench::new(FieldModel::Constant(0.0), 0.1);
        let (mut motion, _) = bench.handles();
        motion.enable(Axis::Axis2).unwrap();
        motion.set_velocity(Axis::Axis2, 1.0).unwrap();
        bench.set_stalled(true);
        motion.move_relative(&[Axis::Axis2], &[1.0]).unwrap();

        assert_eq!(motion.position(Axis::Axis2).unwrap(), 0.0);
        assert!(!motion.wait_motion_end(Axis::Axis2, Duration::from_millis(10)).unwrap());
        assert!(!motion.in_position(Axis::Axis2).unwrap());
    }
}
