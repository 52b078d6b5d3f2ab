//! Table-server wire client
//!
//! ## Overview
//!
//! [`NtClient`] implements the engine's `TelemetryConnector` capability over
//! a plain TCP connection to the robot-side table server, using the
//! line-oriented `GET`/`SET` protocol described at the crate root.
//!
//! ## Failure model
//!
//! Any I/O error on a request drops the transport: the client reports
//! itself disconnected and the tuning engine falls back to its throttled
//! reconnect path. A timed-out or failed read surfaces to the engine as
//! "no data this tick". Nothing here retries on its own; retry policy
//! belongs to the session loop, which knows the poll cadence.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;

use shottuner_core::clock::{Clock, SystemClock};
use shottuner_core::errors::TelemetryError;
use shottuner_core::shot::RawShotReading;
use shottuner_core::telemetry::{keys, TelemetryConnector};

use crate::ConnectionStats;

/// Default table-server port
pub const DEFAULT_PORT: u16 = 5810;

/// Wire-level errors
#[derive(Debug, Error)]
pub enum NtError {
    /// No transport is open
    #[error("not connected")]
    NotConnected,

    /// A bounded read or write exceeded its timeout
    #[error("request timed out")]
    Timeout,

    /// The server replied with something unparseable
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport-level I/O failure
    #[error("i/o error: {0}")]
    Io(String),
}

impl From<NtError> for TelemetryError {
    fn from(err: NtError) -> Self {
        match err {
            NtError::NotConnected => TelemetryError::NotConnected,
            NtError::Timeout => TelemetryError::Timeout,
            NtError::Protocol(msg) => TelemetryError::Protocol(msg),
            NtError::Io(msg) => TelemetryError::Protocol(msg),
        }
    }
}

/// Wire client configuration
#[derive(Debug, Clone)]
pub struct NtConfig {
    /// Server port
    pub port: u16,
    /// Bound on one connection attempt
    pub connect_timeout: Duration,
    /// Bound on waiting for a reply line
    pub read_timeout: Duration,
    /// Bound on pushing a request line
    pub write_timeout: Duration,
}

impl Default for NtConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_millis(250),
            write_timeout: Duration::from_secs(1),
        }
    }
}

impl NtConfig {
    /// Configuration with default timeouts
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the connection-attempt bound in milliseconds
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout = Duration::from_millis(ms);
        self
    }

    /// Set the reply-wait bound in milliseconds
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.read_timeout = Duration::from_millis(ms);
        self
    }

    /// Set the request-push bound in milliseconds
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.write_timeout = Duration::from_millis(ms);
        self
    }
}

struct Transport {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

/// Network-backed `TelemetryConnector`
pub struct NtClient {
    config: NtConfig,
    transport: Option<Transport>,
    stats: ConnectionStats,
    ever_connected: bool,
    clock: SystemClock,
}

impl NtClient {
    /// Client in the disconnected state; call `connect` to open it
    pub fn new(config: NtConfig) -> Self {
        Self {
            config,
            transport: None,
            stats: ConnectionStats::default(),
            ever_connected: false,
            clock: SystemClock,
        }
    }

    /// Counters accumulated over the client's lifetime
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// One request line out, one reply line back
    ///
    /// Any I/O failure drops the transport so the session's reconnect path
    /// takes over.
    fn request(&mut self, line: &str) -> Result<String, NtError> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(NtError::NotConnected);
        };

        let exchange = (|| -> io::Result<String> {
            transport.writer.write_all(line.as_bytes())?;
            transport.writer.write_all(b"\n")?;

            let mut reply = String::new();
            if transport.reader.read_line(&mut reply)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                ));
            }
            Ok(reply)
        })();

        match exchange {
            Ok(reply) => Ok(reply.trim_end().to_string()),
            Err(e) => {
                self.transport = None;
                self.stats.failures += 1;
                self.stats.last_error = Some(e.to_string());
                warn!("request failed, transport dropped: {e}");
                Err(classify_io(e))
            }
        }
    }

    /// Read one key as a number; `Ok(None)` when the key is absent
    fn get(&mut self, key: &str) -> Result<Option<f64>, NtError> {
        let reply = self.request(&format!("GET {key}"))?;

        if reply == "NIL" {
            self.stats.reads += 1;
            return Ok(None);
        }

        let payload = reply
            .strip_prefix("VAL ")
            .ok_or_else(|| NtError::Protocol(format!("unexpected reply '{reply}'")))?;
        let (reply_key, value) = payload
            .split_once(' ')
            .ok_or_else(|| NtError::Protocol(format!("malformed VAL '{reply}'")))?;

        if reply_key != key {
            return Err(NtError::Protocol(format!(
                "asked for {key}, got {reply_key}"
            )));
        }

        let parsed = value
            .parse::<f64>()
            .map_err(|_| NtError::Protocol(format!("non-numeric value '{value}' at {key}")))?;
        self.stats.reads += 1;
        Ok(Some(parsed))
    }

    /// Write one key's raw text value
    fn set_raw(&mut self, key: &str, value: &str) -> Result<(), NtError> {
        let reply = self.request(&format!("SET {key} {value}"))?;
        if reply != "OK" {
            return Err(NtError::Protocol(format!(
                "SET {key} rejected: '{reply}'"
            )));
        }
        self.stats.writes += 1;
        Ok(())
    }
}

fn classify_io(e: io::Error) -> NtError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => NtError::Timeout,
        _ => NtError::Io(e.to_string()),
    }
}

impl TelemetryConnector for NtClient {
    fn connect(&mut self, address: &str) -> Result<(), TelemetryError> {
        let target = format!("{address}:{}", self.config.port);
        let addrs = target
            .to_socket_addrs()
            .map_err(|e| TelemetryError::ConnectFailed {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        let mut last_error: Option<io::Error> = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout) {
                Ok(stream) => {
                    let setup = (|| -> io::Result<Transport> {
                        stream.set_read_timeout(Some(self.config.read_timeout))?;
                        stream.set_write_timeout(Some(self.config.write_timeout))?;
                        stream.set_nodelay(true)?;
                        let reader = BufReader::new(stream.try_clone()?);
                        Ok(Transport {
                            reader,
                            writer: stream,
                        })
                    })();

                    match setup {
                        Ok(transport) => {
                            if self.ever_connected {
                                self.stats.reconnections += 1;
                            }
                            self.ever_connected = true;
                            self.transport = Some(transport);
                            debug!("connected to {addr}");
                            return Ok(());
                        }
                        Err(e) => last_error = Some(e),
                    }
                }
                Err(e) => last_error = Some(e),
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no addresses resolved".to_string());
        self.stats.failures += 1;
        self.stats.last_error = Some(reason.clone());
        Err(TelemetryError::ConnectFailed {
            address: address.to_string(),
            reason,
        })
    }

    fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    fn read_shot(&mut self) -> Option<RawShotReading> {
        if self.transport.is_none() {
            return None;
        }

        // No distance published means no shot yet; absence of the other
        // keys yields a reading the validator will judge on its merits
        let distance = self.get(keys::SHOT_DISTANCE).ok()??;
        let hit = self.get(keys::SHOT_HIT).ok()?.is_some_and(|v| v != 0.0);
        let angle = self.get(keys::SOLUTION_ANGLE).ok()?.unwrap_or(0.0);
        let exit_velocity = self.get(keys::SOLUTION_VELOCITY).ok()?.unwrap_or(0.0);

        Some(RawShotReading {
            hit,
            distance,
            angle,
            exit_velocity,
            observed_at: self.clock.now(),
        })
    }

    fn read_coefficient(&mut self, key: &str, default: f64) -> f64 {
        match self.get(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                debug!("read of {key} failed ({e}), using default {default}");
                default
            }
        }
    }

    fn write_coefficient(&mut self, key: &str, value: f64) -> Result<(), TelemetryError> {
        self.set_raw(key, &format!("{value}"))?;
        Ok(())
    }

    fn is_match_mode(&mut self) -> bool {
        matches!(self.get(keys::MATCH_MODE), Ok(Some(v)) if v != 0.0)
    }

    fn write_status(&mut self, message: &str) {
        // The protocol is line-framed; a status must stay on one line
        let flat = message.replace(['\r', '\n'], " ");
        if let Err(e) = self.set_raw(keys::TUNER_STATUS, &flat) {
            debug!("status write failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = NtConfig::new()
            .port(5811)
            .connect_timeout_ms(1_000)
            .read_timeout_ms(50)
            .write_timeout_ms(100);

        assert_eq!(config.port, 5811);
        assert_eq!(config.connect_timeout, Duration::from_millis(1_000));
        assert_eq!(config.read_timeout, Duration::from_millis(50));
        assert_eq!(config.write_timeout, Duration::from_millis(100));
    }

    #[test]
    fn disconnected_client_refuses_requests() {
        let mut client = NtClient::new(NtConfig::new());
        assert!(!client.is_connected());
        assert!(client.read_shot().is_none());
        assert_eq!(client.read_coefficient("/Tuning/FiringSolver/LaunchHeight", 0.8), 0.8);
        assert!(matches!(
            client.write_coefficient("/Tuning/FiringSolver/LaunchHeight", 0.8),
            Err(TelemetryError::NotConnected)
        ));
    }

    #[test]
    fn timeouts_classify_separately_from_io() {
        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert!(matches!(classify_io(timed_out), NtError::Timeout));

        let broken = io::Error::new(io::ErrorKind::BrokenPipe, "gone");
        assert!(matches!(classify_io(broken), NtError::Io(_)));
    }

    #[test]
    fn wire_errors_map_into_engine_errors() {
        assert_eq!(
            TelemetryError::from(NtError::NotConnected),
            TelemetryError::NotConnected
        );
        assert_eq!(TelemetryError::from(NtError::Timeout), TelemetryError::Timeout);
        assert!(matches!(
            TelemetryError::from(NtError::Protocol("bad".into())),
            TelemetryError::Protocol(_)
        ));
    }
}
