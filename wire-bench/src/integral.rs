//! Field-integral estimation over a scan trace.
//!
//! Each voltage sample converts to a field-integral value through the scan
//! kind's scale factor; the magnetic axis shows up as the sample where the
//! integral magnitude is smallest.

use ndarray::Array1;
use tracing::debug;

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::scan::ScanTrace;

/// The integral-magnitude minimum of a trace.
#[derive(Debug, Clone, Copy)]
pub struct Extremum {
    /// Master axis position of the winning sample, in mm.
    pub coordinate: f64,
    /// Field-integral value at that sample.
    pub integral: f64,
    /// Index of the winning sample in the trace.
    pub index: usize,
}

/// Per-sample field-integral values of a trace.
pub fn integral_values(trace: &ScanTrace, config: &ScanConfig) -> Array1<f64> {
    let scale = trace
        .kind
        .integral_scale(config.speed_mm_s, config.wire_length_mm);
    Array1::from_iter(trace.samples.iter().map(|s| s.voltage * scale))
}

/// Locate the sample with the smallest integral magnitude.
///
/// Ties keep the earliest sample. Non-finite values (a faulted voltmeter
/// reads NaN) never win; a trace with no finite value at all fails with
/// [`ScanError::EmptyTrace`].
pub fn locate_extremum(trace: &ScanTrace, config: &ScanConfig) -> Result<Extremum, ScanError> {
    config.validate()?;
    if trace.len() < 2 {
        return Err(ScanError::EmptyTrace { got: trace.len() });
    }

    let values = integral_values(trace, config);
    let mut best: Option<(usize, f64)> = None;
    for (index, &value) in values.iter().enumerate() {
        if !value.is_finite() {
            continue;
        }
        match best {
            Some((_, incumbent)) if value.abs() >= incumbent.abs() => {}
            _ => best = Some((index, value)),
        }
    }

    let (index, integral) = best.ok_or(ScanError::EmptyTrace { got: 0 })?;
    let coordinate = trace.samples[index].position;
    debug!(%trace.kind, coordinate, integral, index, "extremum located");
    Ok(Extremum {
        coordinate,
        integral,
        index,
    })
}
