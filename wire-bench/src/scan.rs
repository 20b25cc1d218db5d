//! Wire scans: drive an axis pair through a sweep while sampling the
//! induced voltage.
//!
//! A scan moves both members of a pair to the start of a sweep centered on
//! their current position, pauses, then issues the sweep and polls master
//! position and wire voltage at a fixed interval until the master reports
//! in-position. The two scan kinds differ only in the sign pattern of the
//! pair's motion and in how a voltage sample converts to a field integral.

use std::fmt;
use std::str::FromStr;

use hardware::{AxisPair, MotionInterface, VoltageInterface};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::ScanConfig;
use crate::error::ScanError;

/// Which field integral a scan measures.
///
/// FIRST-integral scans move both pair members in the same direction;
/// SECOND-integral scans move them in opposition, pivoting the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanKind {
    First,
    Second,
}

impl ScanKind {
    /// Relative deltas that put the pair at the start of a centered sweep,
    /// master first.
    pub fn offset_deltas(self, span_mm: f64) -> [f64; 2] {
        match self {
            ScanKind::First => [-span_mm / 2.0, -span_mm / 2.0],
            ScanKind::Second => [-span_mm / 2.0, span_mm / 2.0],
        }
    }

    /// Relative deltas of the sweep itself, master first.
    pub fn sweep_deltas(self, span_mm: f64) -> [f64; 2] {
        match self {
            ScanKind::First => [span_mm, span_mm],
            ScanKind::Second => [span_mm, -span_mm],
        }
    }

    /// Factor converting a voltage sample to a field-integral value.
    pub fn integral_scale(self, speed_mm_s: f64, wire_length_mm: f64) -> f64 {
        match self {
            ScanKind::First => 1.0 / speed_mm_s,
            ScanKind::Second => wire_length_mm / (2.0 * speed_mm_s),
        }
    }
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanKind::First => write!(f, "first-integral"),
            ScanKind::Second => write!(f, "second-integral"),
        }
    }
}

impl FromStr for ScanKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" | "ffi" => Ok(ScanKind::First),
            "second" | "sfi" => Ok(ScanKind::Second),
            other => Err(format!("invalid scan kind '{other}', expected first or second")),
        }
    }
}

/// One poll of the sweep.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Sample {
    /// Seconds since the sweep command was issued.
    pub elapsed_s: f64,
    /// Master axis position in mm.
    pub position: f64,
    /// Slave axis position in mm; recorded for second-integral scans only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slave_position: Option<f64>,
    /// Wire voltage in volts.
    pub voltage: f64,
}

/// Samples of one completed scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanTrace {
    pub kind: ScanKind,
    pub pair: AxisPair,
    pub samples: Vec<Sample>,
}

impl ScanTrace {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Run one scan of `pair` and return its trace.
///
/// On a timeout, all axes are stopped before the error is returned. A trace
/// with fewer than two samples fails with [`ScanError::EmptyTrace`].
pub fn run_scan<M, V, C>(
    motion: &mut M,
    voltmeter: &mut V,
    clock: &C,
    pair: AxisPair,
    kind: ScanKind,
    config: &ScanConfig,
) -> Result<ScanTrace, ScanError>
where
    M: MotionInterface + ?Sized,
    V: VoltageInterface + ?Sized,
    C: Clock + ?Sized,
{
    config.validate()?;
    let axes = pair.axes();
    let master = pair.master();

    for axis in axes {
        motion.enable(axis).map_err(ScanError::MotionCommandFailure)?;
        motion
            .set_velocity(axis, config.speed_mm_s)
            .map_err(ScanError::MotionCommandFailure)?;
    }

    info!(
        %kind, %pair,
        span_mm = config.span_mm,
        speed_mm_s = config.speed_mm_s,
        "starting scan"
    );

    // Offset move to the start of a sweep centered on the current position.
    motion
        .move_relative(&axes, &kind.offset_deltas(config.span_mm))
        .map_err(ScanError::MotionCommandFailure)?;
    let reached = motion
        .wait_motion_end(master, config.motion_end_timeout)
        .map_err(ScanError::MotionCommandFailure)?;
    if !reached {
        stop_all(motion);
        return Err(ScanError::ScanTimeout {
            budget_secs: config.motion_end_timeout.as_secs_f64(),
        });
    }
    clock.sleep(config.settle);

    motion
        .move_relative(&axes, &kind.sweep_deltas(config.span_mm))
        .map_err(ScanError::MotionCommandFailure)?;

    let budget = config.sweep_budget();
    let started = clock.now();
    let mut samples = Vec::new();
    loop {
        let position = motion.position(master).map_err(ScanError::MotionCommandFailure)?;
        let slave_position = match kind {
            ScanKind::Second => Some(
                motion
                    .position(pair.slave())
                    .map_err(ScanError::MotionCommandFailure)?,
            ),
            ScanKind::First => None,
        };
        let voltage = voltmeter
            .read_voltage()
            .map_err(ScanError::InstrumentUnavailable)?;
        samples.push(Sample {
            elapsed_s: clock.now().saturating_sub(started).as_secs_f64(),
            position,
            slave_position,
            voltage,
        });

        if motion.in_position(master).map_err(ScanError::MotionCommandFailure)? {
            break;
        }
        if clock.now().saturating_sub(started) > budget {
            warn!(%kind, %pair, "sweep exceeded its wall-clock budget, stopping all axes");
            stop_all(motion);
            return Err(ScanError::ScanTimeout {
                budget_secs: budget.as_secs_f64(),
            });
        }
        clock.sleep(config.poll_interval);
    }

    // The poll loop ends on the master; let the other member settle too.
    let settled = motion
        .wait_motion_end(master, config.motion_end_timeout)
        .map_err(ScanError::MotionCommandFailure)?;
    if !settled {
        stop_all(motion);
        return Err(ScanError::ScanTimeout {
            budget_secs: config.motion_end_timeout.as_secs_f64(),
        });
    }

    if samples.len() < 2 {
        return Err(ScanError::EmptyTrace { got: samples.len() });
    }
    debug!(samples = samples.len(), "scan complete");
    Ok(ScanTrace { kind, pair, samples })
}

fn stop_all<M: MotionInterface + ?Sized>(motion: &mut M) {
    if let Err(e) = motion.kill_all() {
        warn!("emergency stop failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use hardware::sim::{FieldModel, SimBench};
    use hardware::Axis;

    use crate::clock::ManualClock;

    fn linear_bench(dt: f64) -> SimBench {
        SimBench::new(
            FieldModel::Linear {
                x_null: 0.0,
                y_null: 0.0,
                gradient: 1.0,
            },
            dt,
        )
    }

    #[test]
    fn first_scan_sweeps_both_members_together() {
        let bench = linear_bench(0.1);
        let (mut motion, mut meter) = bench.handles();
        let clock = ManualClock::new();
        let config = ScanConfig::default();

        let trace = run_scan(
            &mut motion,
            &mut meter,
            &clock,
            AxisPair::X,
            ScanKind::First,
            &config,
        )
        .unwrap();

        assert_eq!(trace.kind, ScanKind::First);
        // 10 mm sweep at 5 mm/s sampled every 0.5 mm of simulated motion.
        assert_eq!(trace.len(), 20);
        assert!(trace.samples.iter().all(|s| s.slave_position.is_none()));
        let first = trace.samples[0].position;
        let last = trace.samples[trace.len() - 1].position;
        assert_abs_diff_eq!(first, -4.5);
        assert_abs_diff_eq!(last, 5.0);
        // Both members end at the sweep end.
        let positions = bench.positions();
        assert_abs_diff_eq!(positions[Axis::Axis1.index()], 5.0);
        assert_abs_diff_eq!(positions[Axis::Axis3.index()], 5.0);
    }

    #[test]
    fn second_scan_moves_the_slave_in_opposition() {
        let bench = linear_bench(0.1);
        let (mut motion, mut meter) = bench.handles();
        let clock = ManualClock::new();
        let config = ScanConfig::default();

        let trace = run_scan(
            &mut motion,
            &mut meter,
            &clock,
            AxisPair::Y,
            ScanKind::Second,
            &config,
        )
        .unwrap();

        let first = &trace.samples[0];
        let last = &trace.samples[trace.len() - 1];
        assert!(first.position < last.position);
        let first_slave = first.slave_position.unwrap();
        let last_slave = last.slave_position.unwrap();
        assert!(first_slave > last_slave);
        let positions = bench.positions();
        assert_abs_diff_eq!(positions[Axis::Axis0.index()], 5.0);
        assert_abs_diff_eq!(positions[Axis::Axis2.index()], -5.0);
    }

    #[test]
    fn instant_motion_yields_empty_trace() {
        // dt large enough that the first position query lands on target.
        let bench = linear_bench(10.0);
        let (mut motion, mut meter) = bench.handles();
        let clock = ManualClock::new();

        let err = run_scan(
            &mut motion,
            &mut meter,
            &clock,
            AxisPair::X,
            ScanKind::First,
            &ScanConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ScanError::EmptyTrace { got: 1 }));
    }

    #[test]
    fn stalled_offset_move_times_out_and_kills() {
        let bench = linear_bench(0.1);
        bench.set_stalled(true);
        let (mut motion, mut meter) = bench.handles();
        let clock = ManualClock::new();

        let err = run_scan(
            &mut motion,
            &mut meter,
            &clock,
            AxisPair::X,
            ScanKind::First,
            &ScanConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ScanError::ScanTimeout { .. }));
        assert_eq!(bench.kill_count(), 1);
    }

    #[test]
    fn stuck_sweep_exhausts_the_budget_and_kills() {
        // dt of zero: the offset wait still completes, but the sweep never
        // makes progress, so the poll loop runs into the budget.
        let bench = linear_bench(0.0);
        let (mut motion, mut meter) = bench.handles();
        let clock = ManualClock::new();

        let err = run_scan(
            &mut motion,
            &mut meter,
            &clock,
            AxisPair::X,
            ScanKind::First,
            &ScanConfig::default(),
        )
        .unwrap_err();
        match err {
            ScanError::ScanTimeout { budget_secs } => assert_abs_diff_eq!(budget_secs, 13.0),
            other => panic!("unexpected: {other}"),
        }
        assert_eq!(bench.kill_count(), 1);
    }

    #[test]
    fn voltmeter_fault_maps_to_instrument_unavailable() {
        let bench = linear_bench(0.1);
        bench.set_voltage_fault(true);
        let (mut motion, mut meter) = bench.handles();
        let clock = ManualClock::new();

        let err = run_scan(
            &mut motion,
            &mut meter,
            &clock,
            AxisPair::X,
            ScanKind::First,
            &ScanConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ScanError::InstrumentUnavailable(_)));
    }

    #[test]
    fn kind_parsing() {
        assert_eq!("first".parse::<ScanKind>(), Ok(ScanKind::First));
        assert_eq!("SFI".parse::<ScanKind>(), Ok(ScanKind::Second));
        assert!("third".parse::<ScanKind>().is_err());
    }
}
