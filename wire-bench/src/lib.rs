//! Magnetic-axis location for a stretched-wire measurement stage.
//!
//! A stretched wire moved through a magnet picks up a voltage proportional
//! to the field integral along its path. Locating the magnetic axis works in
//! iterations:
//!
//! 1. Sweep each axis pair through a span while sampling the wire voltage
//!    ([`run_scan`]).
//! 2. Convert the samples to field-integral values and find the coordinate
//!    where the integral magnitude is smallest ([`locate_extremum`]).
//! 3. Center the pair on that coordinate ([`center_pair`]).
//! 4. Repeat until no axis moves more than the convergence threshold
//!    between iterations ([`MagneticAxisSearch`]).
//!
//! The measurement logic is written against the capability traits in the
//! `hardware` crate, so it runs unchanged against the real bench or the
//! simulator.

pub mod centering;
pub mod clock;
pub mod config;
pub mod error;
pub mod integral;
pub mod scan;
pub mod search;
pub mod worker;

pub use centering::center_pair;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ScanConfig, SearchConfig};
pub use error::{ScanError, SearchError};
pub use integral::{integral_values, locate_extremum, Extremum};
pub use scan::{run_scan, Sample, ScanKind, ScanTrace};
pub use search::{
    CancelToken, MagneticAxisSearch, SearchEvent, SearchOutcome, SearchReport, STEP_ORDER,
};
pub use worker::{spawn, SearchHandle};
