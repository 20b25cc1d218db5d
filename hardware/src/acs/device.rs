use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use super::errors::{AcsError, AcsResult};

/// TCP port the controller listens on for ASCII connections.
pub const DEFAULT_PORT: u16 = 701;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Line-oriented transport to the controller.
///
/// One request, one reply: every outgoing line is answered with a single
/// CR-terminated line. Rejected commands answer `?<code>`.
pub struct AcsDevice {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    address: String,
    timeout: Duration,
}

impl AcsDevice {
    pub fn connect<A: ToSocketAddrs + ToString>(address: A) -> AcsResult<Self> {
        let address_str = address.to_string();
        let stream = TcpStream::connect(&address)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(DEFAULT_TIMEOUT))?;
        stream.set_write_timeout(Some(DEFAULT_TIMEOUT))?;
        let reader = BufReader::new(stream.try_clone()?);
        info!("connected to ACS controller at {address_str}");
        Ok(AcsDevice {
            stream,
            reader,
            address: address_str,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Connect to the controller's default ASCII port on the given host.
    pub fn connect_ip(ip: &str) -> AcsResult<Self> {
        Self::connect(format!("{ip}:{DEFAULT_PORT}"))
    }

    /// Drop the current connection and open a fresh one to the same address.
    pub fn reconnect(&mut self) -> AcsResult<()> {
        let stream = TcpStream::connect(&self.address)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        self.reader = BufReader::new(stream.try_clone()?);
        self.stream = stream;
        info!("reconnected to ACS controller at {}", self.address);
        Ok(())
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> AcsResult<()> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))?;
        self.timeout = timeout;
        Ok(())
    }

    /// Send one line without waiting for the reply.
    pub fn send(&mut self, line: &str) -> AcsResult<()> {
        debug!("acs send: {line}");
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\r")?;
        self.stream.flush()?;
        Ok(())
    }

    /// Read one CR-terminated reply line, trimmed.
    pub fn read(&mut self) -> AcsResult<String> {
        let mut buf = Vec::new();
        match self.reader.read_until(b'\r', &mut buf) {
            Ok(0) => return Err(AcsError::InvalidResponse("connection closed".into())),
            Ok(_) => {}
            Err(e) if is_timeout(&e) => return Err(AcsError::Timeout),
            Err(e) => return Err(e.into()),
        }
        let line = String::from_utf8_lossy(&buf).trim().to_string();
        debug!("acs read: {line}");
        Ok(line)
    }

    /// Send a query and return its reply line.
    pub fn query(&mut self, line: &str) -> AcsResult<String> {
        self.send(line)?;
        let reply = self.read()?;
        Self::check_rejection(&reply)?;
        Ok(reply)
    }

    /// Send a command that carries no data back; only the acknowledgement is
    /// consumed.
    pub fn command(&mut self, line: &str) -> AcsResult<()> {
        self.send(line)?;
        let reply = self.read()?;
        Self::check_rejection(&reply)?;
        Ok(())
    }

    /// Parse a reply consisting of a single number.
    pub fn parse_single_value(reply: &str) -> AcsResult<f64> {
        reply
            .trim()
            .parse()
            .map_err(|_| AcsError::Parse(format!("expected a number, got '{reply}'")))
    }

    fn check_rejection(reply: &str) -> AcsResult<()> {
        if let Some(code) = reply.strip_prefix('?') {
            let code = code
                .trim()
                .parse()
                .map_err(|_| AcsError::InvalidResponse(format!("malformed error reply '{reply}'")))?;
            return Err(AcsError::Controller { code });
        }
        Ok(())
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}
