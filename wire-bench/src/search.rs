//! The magnetic-axis search: scan, locate, center, repeat until the stage
//! stops moving.
//!
//! Each iteration runs the four scan steps in a fixed order — first-integral
//! X, first-integral Y, second-integral X, second-integral Y — centering the
//! scanned pair on the located extremum after each step. The stage positions
//! are snapshotted at the start and end of every iteration; when no axis
//! moved more than the convergence threshold, the axis has been found.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use hardware::{Axis, AxisPair, MotionInterface, VoltageInterface};
use serde::Serialize;
use tracing::{info, warn};

use crate::centering::center_pair;
use crate::clock::Clock;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::integral::locate_extremum;
use crate::scan::{run_scan, ScanKind};

/// Scan steps of one iteration, in execution order.
pub const STEP_ORDER: [(ScanKind, AxisPair); 4] = [
    (ScanKind::First, AxisPair::X),
    (ScanKind::First, AxisPair::Y),
    (ScanKind::Second, AxisPair::X),
    (ScanKind::Second, AxisPair::Y),
];

/// Cooperative stop flag, checked between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How the search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchOutcome {
    /// Every axis moved less than the threshold during the last iteration.
    Converged { iterations: u32 },
    /// The iteration budget ran out first; the reported positions are the
    /// best estimate so far, not an error.
    IterationLimit { iterations: u32 },
    /// Cancelled between steps; all axes stopped.
    Aborted,
}

/// Final result of a search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub outcome: SearchOutcome,
    /// Absolute positions of axes 0..3 in mm at termination.
    pub positions: [f64; 4],
}

/// Progress notifications emitted while the search runs.
#[derive(Debug, Clone)]
pub enum SearchEvent {
    IterationStarted {
        iteration: u32,
    },
    ScanCompleted {
        iteration: u32,
        kind: ScanKind,
        pair: AxisPair,
        samples: usize,
        coordinate: f64,
        integral: f64,
    },
    PairCentered {
        iteration: u32,
        pair: AxisPair,
        target: f64,
        confirmed: bool,
    },
    IterationFinished {
        iteration: u32,
        deltas: [f64; 4],
    },
}

/// Owns the instruments for the duration of a search.
pub struct MagneticAxisSearch<M, V, C> {
    motion: M,
    voltmeter: V,
    clock: C,
    config: SearchConfig,
    cancel: CancelToken,
    events: Option<Sender<SearchEvent>>,
}

impl<M, V, C> MagneticAxisSearch<M, V, C>
where
    M: MotionInterface,
    V: VoltageInterface,
    C: Clock,
{
    pub fn new(motion: M, voltmeter: V, clock: C, config: SearchConfig) -> Self {
        MagneticAxisSearch {
            motion,
            voltmeter,
            clock,
            config,
            cancel: CancelToken::new(),
            events: None,
        }
    }

    /// Token that cancels this search from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Send progress events to `sender` while running.
    pub fn with_events(mut self, sender: Sender<SearchEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Run iterations until convergence, the iteration budget, a cancel, or
    /// a step failure.
    pub fn run(&mut self) -> Result<SearchReport, SearchError> {
        self.config
            .validate()
            .map_err(|source| SearchError::Config { source })?;

        let mut iteration: u32 = 1;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.abort());
            }
            info!(iteration, "starting magnetic-axis iteration");
            self.emit(SearchEvent::IterationStarted { iteration });
            let start = self.snapshot(iteration)?;

            for (kind, pair) in STEP_ORDER {
                if self.cancel.is_cancelled() {
                    return Ok(self.abort());
                }
                self.run_step(iteration, kind, pair)?;
            }

            let end = self.snapshot(iteration)?;
            let mut deltas = [0.0; 4];
            for (delta, (before, after)) in deltas.iter_mut().zip(start.iter().zip(&end)) {
                *delta = (after - before).abs();
            }
            info!(iteration, ?deltas, "iteration finished");
            self.emit(SearchEvent::IterationFinished { iteration, deltas });

            if deltas
                .iter()
                .all(|d| *d < self.config.convergence_threshold_mm)
            {
                info!(iteration, positions = ?end, "magnetic axis found");
                return Ok(SearchReport {
                    outcome: SearchOutcome::Converged { iterations: iteration },
                    positions: end,
                });
            }
            if iteration >= self.config.max_iterations {
                info!(iteration, positions = ?end, "iteration budget exhausted");
                return Ok(SearchReport {
                    outcome: SearchOutcome::IterationLimit { iterations: iteration },
                    positions: end,
                });
            }
            iteration += 1;
        }
    }

    fn run_step(&mut self, iteration: u32, kind: ScanKind, pair: AxisPair) -> Result<(), SearchError> {
        let wrap = |source| SearchError::Step {
            kind,
            pair,
            iteration,
            source,
        };

        let trace = run_scan(
            &mut self.motion,
            &mut self.voltmeter,
            &self.clock,
            pair,
            kind,
            &self.config.scan,
        )
        .map_err(wrap)?;
        let extremum = locate_extremum(&trace, &self.config.scan).map_err(wrap)?;
        info!(
            %kind, %pair, iteration,
            coordinate = extremum.coordinate,
            integral = extremum.integral,
            "extremum located"
        );
        self.emit(SearchEvent::ScanCompleted {
            iteration,
            kind,
            pair,
            samples: trace.len(),
            coordinate: extremum.coordinate,
            integral: extremum.integral,
        });

        let confirmed = center_pair(
            &mut self.motion,
            pair,
            extremum.coordinate,
            self.config.centering_timeout,
        )
        .map_err(wrap)?;
        if !confirmed {
            warn!(%pair, iteration, "centering unconfirmed, continuing from reached position");
        }
        self.emit(SearchEvent::PairCentered {
            iteration,
            pair,
            target: extremum.coordinate,
            confirmed,
        });
        Ok(())
    }

    fn snapshot(&mut self, iteration: u32) -> Result<[f64; 4], SearchError> {
        let mut positions = [0.0; 4];
        for axis in Axis::ALL {
            positions[axis.index()] = self
                .motion
                .position(axis)
                .map_err(|message| SearchError::Snapshot { iteration, message })?;
        }
        Ok(positions)
    }

    fn abort(&mut self) -> SearchReport {
        warn!("stop requested, aborting magnetic-axis search");
        if let Err(e) = self.motion.kill_all() {
            warn!("emergency stop failed: {e}");
        }
        let positions = self.snapshot(0).unwrap_or([f64::NAN; 4]);
        SearchReport {
            outcome: SearchOutcome::Aborted,
            positions,
        }
    }

    fn emit(&self, event: SearchEvent) {
        if let Some(sender) = &self.events {
            // A gone receiver only means nobody is watching.
            let _ = sender.send(event);
        }
    }
}
