//! Command-line tool for the stretched-wire bench: single scans, full
//! magnetic-axis searches, and axis housekeeping.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use hardware::{AcsController, Axis, AxisPair, BenchArgs};
use tracing::info;
use wire_bench::{
    center_pair, locate_extremum, run_scan, spawn, MagneticAxisSearch, ScanConfig, ScanKind,
    ScanTrace, SearchConfig, SearchEvent, SystemClock,
};

#[derive(Parser)]
#[command(name = "bench_tool", about = "Stretched-wire bench control")]
struct Args {
    #[command(flatten)]
    bench: BenchArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one scan of an axis pair and write the trace to CSV
    Scan {
        /// Axis pair to scan (X or Y)
        #[arg(short, long)]
        pair: AxisPair,
        /// Scan kind (first or second)
        #[arg(short, long, default_value = "first")]
        kind: ScanKind,
        /// Sweep span in mm
        #[arg(long, default_value_t = 10.0)]
        span: f64,
        /// Sweep speed in mm/s
        #[arg(long, default_value_t = 5.0)]
        speed: f64,
        /// Output CSV path
        #[arg(short, long, default_value = "trace.csv")]
        output: PathBuf,
    },
    /// Run the full magnetic-axis search
    FindAxis {
        /// Sweep span in mm
        #[arg(long, default_value_t = 10.0)]
        span: f64,
        /// Sweep speed in mm/s
        #[arg(long, default_value_t = 5.0)]
        speed: f64,
        /// Convergence threshold in mm
        #[arg(long, default_value_t = 0.005)]
        threshold: f64,
        /// Iteration budget
        #[arg(long, default_value_t = 3)]
        max_iterations: u32,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report position and motor state of every axis
    Query,
    /// Enable an axis, or all axes
    Enable { axis: Option<Axis> },
    /// Disable an axis, or all axes
    Off { axis: Option<Axis> },
    /// Stop all motion immediately
    Kill,
    /// Center an axis pair on a coordinate
    Center {
        /// Axis pair to center (X or Y)
        #[arg(short, long)]
        pair: AxisPair,
        /// Target coordinate in mm
        target: f64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    match args.command {
        Command::Scan {
            pair,
            kind,
            span,
            speed,
            output,
        } => cmd_scan(&args.bench, pair, kind, span, speed, &output),
        Command::FindAxis {
            span,
            speed,
            threshold,
            max_iterations,
            json,
        } => cmd_find_axis(&args.bench, span, speed, threshold, max_iterations, json),
        Command::Query => cmd_query(&args.bench),
        Command::Enable { axis } => cmd_enable(&args.bench, axis),
        Command::Off { axis } => cmd_off(&args.bench, axis),
        Command::Kill => cmd_kill(&args.bench),
        Command::Center { pair, target } => cmd_center(&args.bench, pair, target),
    }
}

fn connect(bench: &BenchArgs) -> Result<AcsController> {
    bench.connect_controller().map_err(|e| anyhow!(e))
}

fn cmd_scan(
    bench: &BenchArgs,
    pair: AxisPair,
    kind: ScanKind,
    span: f64,
    speed: f64,
    output: &PathBuf,
) -> Result<()> {
    let mut controller = connect(bench)?;
    let mut voltmeter = bench.connect_voltmeter().map_err(|e| anyhow!(e))?;
    let config = ScanConfig {
        span_mm: span,
        speed_mm_s: speed,
        ..ScanConfig::default()
    };

    let trace = run_scan(
        &mut controller,
        &mut voltmeter,
        &SystemClock::new(),
        pair,
        kind,
        &config,
    )?;
    let extremum = locate_extremum(&trace, &config)?;
    info!(
        samples = trace.len(),
        coordinate = extremum.coordinate,
        integral = extremum.integral,
        "scan complete"
    );

    write_trace_csv(&trace, output)
        .with_context(|| format!("writing {}", output.display()))?;
    info!("trace written to {}", output.display());
    Ok(())
}

fn cmd_find_axis(
    bench: &BenchArgs,
    span: f64,
    speed: f64,
    threshold: f64,
    max_iterations: u32,
    json: bool,
) -> Result<()> {
    let controller = connect(bench)?;
    let voltmeter = bench.connect_voltmeter().map_err(|e| anyhow!(e))?;
    let config = SearchConfig {
        scan: ScanConfig {
            span_mm: span,
            speed_mm_s: speed,
            ..ScanConfig::default()
        },
        convergence_threshold_mm: threshold,
        max_iterations,
        ..SearchConfig::default()
    };

    let search = MagneticAxisSearch::new(controller, voltmeter, SystemClock::new(), config);
    let handle = spawn(search).context("spawning search worker")?;
    for event in &handle.events {
        match event {
            SearchEvent::ScanCompleted {
                iteration,
                kind,
                pair,
                samples,
                coordinate,
                integral,
            } => info!(
                iteration, %kind, %pair, samples, coordinate, integral,
                "scan step complete"
            ),
            SearchEvent::IterationFinished { iteration, deltas } => {
                info!(iteration, ?deltas, "iteration finished")
            }
            _ => {}
        }
    }
    let report = handle.join()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("outcome: {:?}", report.outcome);
        for axis in Axis::ALL {
            println!("axis {axis}: {:.4} mm", report.positions[axis.index()]);
        }
    }
    Ok(())
}

fn cmd_query(bench: &BenchArgs) -> Result<()> {
    let mut controller = connect(bench)?;
    for axis in Axis::ALL {
        let position = controller.position(axis)?;
        let state = controller.motor_state(axis)?;
        println!(
            "axis {axis}: {position:.4} mm  enabled={} moving={} in_position={}",
            state.enabled, state.moving, state.in_position
        );
    }
    Ok(())
}

fn cmd_enable(bench: &BenchArgs, axis: Option<Axis>) -> Result<()> {
    let mut controller = connect(bench)?;
    for axis in axis.map_or_else(|| Axis::ALL.to_vec(), |a| vec![a]) {
        controller.enable(axis)?;
        info!("axis {axis} enabled");
    }
    Ok(())
}

fn cmd_off(bench: &BenchArgs, axis: Option<Axis>) -> Result<()> {
    let mut controller = connect(bench)?;
    for axis in axis.map_or_else(|| Axis::ALL.to_vec(), |a| vec![a]) {
        controller.disable(axis)?;
        info!("axis {axis} disabled");
    }
    Ok(())
}

fn cmd_kill(bench: &BenchArgs) -> Result<()> {
    let mut controller = connect(bench)?;
    controller.kill_all()?;
    Ok(())
}

fn cmd_center(bench: &BenchArgs, pair: AxisPair, target: f64) -> Result<()> {
    let mut controller = connect(bench)?;
    let confirmed = center_pair(
        &mut controller,
        pair,
        target,
        SearchConfig::default().centering_timeout,
    )?;
    if !confirmed {
        return Err(anyhow!("centering move not confirmed"));
    }
    info!("{pair} pair centered at {target} mm");
    Ok(())
}

fn write_trace_csv(trace: &ScanTrace, path: &PathBuf) -> Result<()> {
    let mut file = File::create(path)?;
    match trace.kind {
        ScanKind::First => writeln!(file, "time_s,position_mm,voltage_v")?,
        ScanKind::Second => writeln!(file, "time_s,position_mm,slave_position_mm,voltage_v")?,
    }
    for sample in &trace.samples {
        match sample.slave_position {
            Some(slave) => writeln!(
                file,
                "{:.3},{:.5},{:.5},{:.6e}",
                sample.elapsed_s, sample.position, slave, sample.voltage
            )?,
            None => writeln!(
                file,
                "{:.3},{:.5},{:.6e}",
                sample.elapsed_s, sample.position, sample.voltage
            )?,
        }
    }
    Ok(())
}
