//! Serial link to the rover's microcontroller.
//!
//! One device is opened once and split into a write half for the command arbiter and a
//! read half for the telemetry loop. The read half uses a short port timeout so the
//! loop can notice cancellation between lines.

use crate::command::CommandSink;
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SerialError {
    #[error("Failed to open serial device {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Failed to split serial device {path}: {source}")]
    Split {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Serial read failed: {0}")]
    Read(#[from] io::Error),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path of the microcontroller
    pub port: String,
    pub baud: u32,
    /// Port read timeout; bounds how long shutdown waits on the reader
    pub read_timeout_ms: u64,
    /// Pause after opening the port while the microcontroller resets
    pub startup_settle_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB1".to_string(),
            baud: 9600,
            read_timeout_ms: 500,
            startup_settle_ms: 500,
        }
    }
}

/// Blocking line reader
pub trait LineSource {
    /// Returns the next complete line including its terminator.
    ///
    /// `Ok(None)` means no full line arrived before the read timeout; partial data is
    /// kept for the next call.
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// Write half of the serial link
pub struct SerialSink<W: Write + Send = Box<dyn SerialPort>> {
    port: W,
}

impl<W: Write + Send> SerialSink<W> {
    pub fn new(port: W) -> Self {
        Self { port }
    }
}

impl<W: Write + Send> CommandSink for SerialSink<W> {
    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.port.write_all(line)?;
        self.port.flush()
    }
}

/// Read half of the serial link
pub struct SerialLineReader<R: Read = Box<dyn SerialPort>> {
    reader: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: Read> SerialLineReader<R> {
    pub fn new(port: R) -> Self {
        Self {
            reader: BufReader::new(port),
            pending: Vec::new(),
        }
    }
}

impl<R: Read> LineSource for SerialLineReader<R> {
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) if self.pending.is_empty() => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "serial device closed",
            )),
            Ok(_) => Ok(Some(std::mem::take(&mut self.pending))),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Opens the configured device and splits it into writer and reader halves.
pub fn open(config: &SerialConfig) -> Result<(SerialSink, SerialLineReader), SerialError> {
    info!("Opening serial device {} at {} baud", config.port, config.baud);
    let port = serialport::new(&config.port, config.baud)
        .timeout(Duration::from_millis(config.read_timeout_ms))
        .open()
        .map_err(|source| SerialError::Open {
            path: config.port.clone(),
            source,
        })?;

    let reader = port.try_clone().map_err(|source| SerialError::Split {
        path: config.port.clone(),
        source,
    })?;
    debug!("Serial device {} split into reader and writer", config.port);

    Ok((SerialSink::new(port), SerialLineReader::new(reader)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Yields its chunks one read at a time, timing out between them.
    struct ChunkedPort {
        chunks: Vec<Vec<u8>>,
        timed_out: bool,
    }

    impl Read for ChunkedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.timed_out {
                self.timed_out = true;
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
            }
            self.timed_out = false;
            if self.chunks.is_empty() {
                return Ok(0);
            }
            let chunk = self.chunks.remove(0);
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn reads_whole_lines() {
        let mut reader = SerialLineReader::new(Cursor::new(b"lat,1,long,2\r\nok\n".to_vec()));
        assert_eq!(reader.read_line().unwrap(), Some(b"lat,1,long,2\r\n".to_vec()));
        assert_eq!(reader.read_line().unwrap(), Some(b"ok\n".to_vec()));
        assert_eq!(
            reader.read_line().unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn keeps_partial_line_across_timeouts() {
        let mut reader = SerialLineReader::new(ChunkedPort {
            chunks: vec![b"lat,3".to_vec(), b"5.3,long,1\n".to_vec()],
            timed_out: false,
        });

        let mut lines = Vec::new();
        for _ in 0..6 {
            match reader.read_line() {
                Ok(Some(line)) => lines.push(line),
                Ok(None) => {}
                Err(_) => break,
            }
        }
        assert_eq!(lines, vec![b"lat,35.3,long,1\n".to_vec()]);
    }

    #[test]
    fn sink_writes_complete_line() {
        let mut sink = SerialSink::new(Vec::new());
        sink.write_line(b"m: 1\n").unwrap();
        sink.write_line(b"x:6 y:0\n").unwrap();
        assert_eq!(sink.port, b"m: 1\nx:6 y:0\n");
    }
}
