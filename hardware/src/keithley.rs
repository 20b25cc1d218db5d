//! Driver for a Keithley 2182A nanovoltmeter behind a SCPI-over-TCP bridge.
//!
//! The instrument is configured once at connect time for fast free-running
//! voltage readings on channel 2 (the wire input): auto-zero off, NPLC 0.01,
//! immediate continuous triggering. After that a single `:FETC?` returns the
//! latest reading. The instrument never answers `:FETC?` while it is faulted,
//! so the socket read timeout is what bounds the call.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::VoltageInterface;

/// Address of the bench's GPIB-to-LAN bridge, raw SCPI port.
pub const DEFAULT_VOLTMETER_ADDR: &str = "10.0.0.7:5025";

const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Commands issued once after connecting, in order.
const INIT_SEQUENCE: &[&str] = &[
    "*RST",
    "*CLS",
    ":SYST:AZER OFF",
    ":SENS:CHAN 2",
    ":SENS:FUNC 'VOLT'",
    ":SENS:VOLT:NPLC 0.01",
    ":FORM:ELEM READ",
    ":TRIG:SOUR IMM",
    ":TRIG:COUNT INF",
    ":INIT:CONT ON",
];

#[derive(Error, Debug)]
pub enum KeithleyError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out waiting for a reading")]
    Timeout,

    #[error("parse error: {0}")]
    Parse(String),
}

pub struct Keithley2182a {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Keithley2182a {
    pub fn connect<A: ToSocketAddrs>(address: A) -> Result<Self, KeithleyError> {
        let stream = TcpStream::connect(address)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.set_write_timeout(Some(READ_TIMEOUT))?;
        let reader = BufReader::new(stream.try_clone()?);
        let mut meter = Keithley2182a { stream, reader };
        let idn = meter.idn()?;
        info!("connected to nanovoltmeter: {idn}");
        for cmd in INIT_SEQUENCE {
            meter.write(cmd)?;
        }
        Ok(meter)
    }

    pub fn idn(&mut self) -> Result<String, KeithleyError> {
        self.query("*IDN?")
    }

    /// Latest reading in volts.
    pub fn read_voltage(&mut self) -> Result<f64, KeithleyError> {
        let reply = self.query(":FETC?")?;
        reply
            .trim()
            .parse()
            .map_err(|_| KeithleyError::Parse(format!("expected a voltage, got '{reply}'")))
    }

    fn write(&mut self, command: &str) -> Result<(), KeithleyError> {
        debug!("scpi send: {command}");
        self.stream.write_all(command.as_bytes())?;
        self.stream.write_all(b"\n")?;
        self.stream.flush()?;
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String, KeithleyError> {
        self.write(command)?;
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => Err(KeithleyError::Parse("connection closed".into())),
            Ok(_) => Ok(line.trim().to_string()),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Err(KeithleyError::Timeout)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl VoltageInterface for Keithley2182a {
    fn read_voltage(&mut self) -> Result<f64, String> {
        Keithley2182a::read_voltage(self).map_err(|e| format!("voltmeter read: {e}"))
    }
}
