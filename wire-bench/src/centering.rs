//! Driving both members of an axis pair to a common coordinate.

use std::time::Duration;

use hardware::{AxisPair, MotionInterface};
use tracing::{debug, info, warn};

use crate::error::ScanError;

/// Move both members of `pair` to the absolute coordinate `target_mm`.
///
/// The move is issued as relative deltas from each member's current
/// position, in one command. If both deltas are exactly zero no command is
/// issued. Returns whether the move was confirmed in-position within the
/// timeout; an unconfirmed move is not an error, the caller decides.
pub fn center_pair<M>(
    motion: &mut M,
    pair: AxisPair,
    target_mm: f64,
    timeout: Duration,
) -> Result<bool, ScanError>
where
    M: MotionInterface + ?Sized,
{
    let axes = pair.axes();
    let mut deltas = [0.0; 2];
    for (delta, axis) in deltas.iter_mut().zip(axes) {
        let position = motion
            .position(axis)
            .map_err(ScanError::MotionCommandFailure)?;
        *delta = target_mm - position;
    }

    if deltas == [0.0, 0.0] {
        debug!(%pair, target_mm, "pair already centered");
        return Ok(true);
    }

    info!(
        %pair, target_mm,
        master_delta = deltas[0],
        slave_delta = deltas[1],
        "centering pair"
    );
    motion
        .move_relative(&axes, &deltas)
        .map_err(ScanError::MotionCommandFailure)?;
    let confirmed = motion
        .wait_motion_end(pair.master(), timeout)
        .map_err(ScanError::MotionCommandFailure)?;
    if !confirmed {
        warn!(%pair, "centering move not confirmed within {timeout:?}");
    }
    Ok(confirmed)
}
