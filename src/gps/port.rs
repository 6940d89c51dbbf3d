// src/gps/port.rs
//! Line-oriented transport for NMEA devices

use crate::error::{FixError, Result};
use std::{fmt, io, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::Mutex,
};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// Longest line kept. NMEA-0183 sentences are at most 82 characters.
pub const MAX_LINE: usize = 256;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Outcome of a single [`NmeaPort::read_line`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortRead {
    /// A complete, trimmed, non-empty line.
    Line(String),
    /// Nothing usable arrived: the read timed out or the line was blank.
    Idle,
    /// The underlying stream reached end of file.
    Closed,
}

struct LineBuffer {
    reader: BufReader<BoxedReader>,
    // Holds a partial line across timed-out reads
    pending: Vec<u8>,
    // Skipping the rest of an overlong line
    discarding: bool,
}

impl LineBuffer {
    /// Buffer bytes up to and including the next newline. Returns false at
    /// end of stream.
    ///
    /// Lines longer than [`MAX_LINE`] are dropped up to their newline and
    /// leave `pending` empty.
    async fn fill(&mut self, port: &str) -> io::Result<bool> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(false);
            }
            let (used, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(end) => (end + 1, true),
                None => (available.len(), false),
            };
            if !self.discarding {
                self.pending.extend_from_slice(&available[..used]);
            }
            self.reader.consume(used);

            if self.pending.len() > MAX_LINE {
                debug!(port, bytes = self.pending.len(), "Discarding overlong line");
                self.pending.clear();
                self.discarding = true;
            }
            if complete {
                self.discarding = false;
                return Ok(true);
            }
        }
    }
}

/// A named byte stream read one NMEA line at a time.
///
/// The port does not own the device lifecycle beyond holding the stream;
/// readers never close it. Share it as `Arc<NmeaPort>`.
pub struct NmeaPort {
    name: String,
    read_timeout: Option<Duration>,
    inner: Mutex<LineBuffer>,
}

impl NmeaPort {
    /// Wrap any async byte stream
    pub fn new<R>(name: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            name: name.into(),
            read_timeout: None,
            inner: Mutex::new(LineBuffer {
                reader: BufReader::new(Box::new(reader)),
                pending: Vec::new(),
                discarding: false,
            }),
        }
    }

    /// Bound each read; an expired read reports [`PortRead::Idle`]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Open a serial GPS or compass device
    pub fn open_serial(path: &str, baudrate: u32) -> Result<Self> {
        let serial = tokio_serial::new(path, baudrate)
            .timeout(Duration::from_millis(1000))
            .open_native_async()
            .map_err(|e| {
                warn!(port = path, error = %e, "Failed to open serial port");
                FixError::Serial(e)
            })?;

        info!(port = path, baudrate, "Opened serial port");
        Ok(Self::new(path, serial))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read the next line.
    ///
    /// Cancel safe: a line interrupted by a timeout or a dropped future is
    /// kept and completed by the next call.
    pub async fn read_line(&self) -> io::Result<PortRead> {
        let mut guard = self.inner.lock().await;

        let fill = guard.fill(&self.name);
        let more = match self.read_timeout {
            Some(limit) => match tokio::time::timeout(limit, fill).await {
                Ok(result) => result?,
                Err(_) => return Ok(PortRead::Idle),
            },
            None => fill.await?,
        };

        // EOF after a partial line still yields that line first
        if !more && guard.pending.is_empty() {
            return Ok(PortRead::Closed);
        }

        let line = String::from_utf8_lossy(&guard.pending).trim().to_string();
        guard.pending.clear();

        if line.is_empty() {
            Ok(PortRead::Idle)
        } else {
            Ok(PortRead::Line(line))
        }
    }
}

impl fmt::Debug for NmeaPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NmeaPort")
            .field("name", &self.name)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

/// List available serial ports as `(name, description)` pairs
pub fn list_serial_ports() -> Result<Vec<(String, String)>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| FixError::Other(format!("Failed to list serial ports: {}", e)))?;

    Ok(ports
        .into_iter()
        .map(|port| (port.port_name, format!("{:?}", port.port_type)))
        .collect())
}
