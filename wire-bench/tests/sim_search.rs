//! End-to-end searches against the simulated bench.

use approx::assert_abs_diff_eq;
use hardware::sim::{FieldModel, SimBench};
use hardware::{Axis, AxisPair};
use wire_bench::{
    spawn, MagneticAxisSearch, ManualClock, ScanError, SearchConfig, SearchError, SearchEvent,
    SearchOutcome, ScanKind,
};

const SIM_DT: f64 = 0.1;

fn centered_field() -> FieldModel {
    FieldModel::Linear {
        x_null: 0.0,
        y_null: 0.0,
        gradient: 1.0,
    }
}

fn bench_with_start(model: FieldModel, start_mm: f64) -> SimBench {
    let bench = SimBench::new(model, SIM_DT);
    for axis in Axis::ALL {
        bench.set_position(axis, start_mm);
    }
    bench
}

fn search_on(
    bench: &SimBench,
    config: SearchConfig,
) -> MagneticAxisSearch<hardware::sim::SimMotion, hardware::sim::SimVoltmeter, ManualClock> {
    let (motion, voltmeter) = bench.handles();
    MagneticAxisSearch::new(motion, voltmeter, ManualClock::new(), config)
}

#[test]
fn search_converges_on_a_linear_field() {
    let bench = bench_with_start(centered_field(), 0.25);
    let mut search = search_on(&bench, SearchConfig::default());

    let report = search.run().unwrap();

    // The scan samples straddle the null at +/-0.25 mm; the tie-break picks
    // -0.25, every pair centers there in iteration 1 and iteration 2
    // reproduces it exactly.
    assert_eq!(report.outcome, SearchOutcome::Converged { iterations: 2 });
    for position in report.positions {
        assert_abs_diff_eq!(position, -0.25);
    }
    for position in bench.positions() {
        assert_abs_diff_eq!(position, -0.25);
    }
}

#[test]
fn featureless_field_exhausts_the_iteration_budget() {
    let bench = bench_with_start(FieldModel::Constant(0.5), 0.25);
    let config = SearchConfig {
        max_iterations: 2,
        ..SearchConfig::default()
    };
    let mut search = search_on(&bench, config);

    let report = search.run().unwrap();

    // A constant voltage ties everywhere, so every scan centers on its first
    // sample and the stage walks away instead of settling.
    assert_eq!(report.outcome, SearchOutcome::IterationLimit { iterations: 2 });
}

#[test]
fn stalled_stage_fails_the_first_step_and_stops_the_axes() {
    let bench = bench_with_start(centered_field(), 0.0);
    bench.set_stalled(true);
    let mut search = search_on(&bench, SearchConfig::default());

    let err = search.run().unwrap_err();
    match err {
        SearchError::Step {
            kind: ScanKind::First,
            pair: AxisPair::X,
            iteration: 1,
            source: ScanError::ScanTimeout { .. },
        } => {}
        other => panic!("unexpected: {other}"),
    }
    assert_eq!(bench.kill_count(), 1);
}

#[test]
fn cancelled_search_aborts_before_touching_the_stage() {
    let bench = bench_with_start(centered_field(), 1.0);
    let mut search = search_on(&bench, SearchConfig::default());
    search.cancel_token().cancel();

    let report = search.run().unwrap();

    assert_eq!(report.outcome, SearchOutcome::Aborted);
    assert_eq!(bench.kill_count(), 1);
    assert_eq!(bench.move_count(), 0);
    for position in report.positions {
        assert_abs_diff_eq!(position, 1.0);
    }
}

#[test]
fn worker_thread_reports_progress_and_the_final_report() {
    let bench = bench_with_start(centered_field(), 0.25);
    let search = search_on(&bench, SearchConfig::default());

    let handle = spawn(search).unwrap();
    let events: Vec<SearchEvent> = handle.events.iter().collect();
    let report = handle.join().unwrap();

    assert_eq!(report.outcome, SearchOutcome::Converged { iterations: 2 });

    let started = events
        .iter()
        .filter(|e| matches!(e, SearchEvent::IterationStarted { .. }))
        .count();
    let scans = events
        .iter()
        .filter(|e| matches!(e, SearchEvent::ScanCompleted { .. }))
        .count();
    let centerings = events
        .iter()
        .filter(|e| matches!(e, SearchEvent::PairCentered { .. }))
        .count();
    assert_eq!(started, 2);
    assert_eq!(scans, 8);
    assert_eq!(centerings, 8);

    // The last iteration reports deltas under the threshold on every axis.
    let last = events
        .iter()
        .rev()
        .find_map(|e| match e {
            SearchEvent::IterationFinished { deltas, .. } => Some(*deltas),
            _ => None,
        })
        .unwrap();
    assert!(last.iter().all(|d| *d < 0.005));
}

#[test]
fn cancel_through_the_worker_handle() {
    let bench = bench_with_start(centered_field(), 0.25);
    let search = search_on(&bench, SearchConfig::default());

    let handle = spawn(search).unwrap();
    handle.cancel();
    let report = handle.join().unwrap();

    // The cancel may land before the first step or after the search already
    // finished; both are orderly endings.
    assert!(matches!(
        report.outcome,
        SearchOutcome::Aborted | SearchOutcome::Converged { .. }
    ));
}
