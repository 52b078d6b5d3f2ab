//! Telemetry Connector Capability
//!
//! ## Overview
//!
//! The tuning engine never talks to a wire directly. It consumes the
//! [`TelemetryConnector`] capability and nothing else. Two implementations
//! exist by design:
//!
//! - a real network-backed client (`shottuner-connectors`)
//! - [`InMemoryConnector`], a deterministic in-memory fake for tests
//!
//! There is deliberately no silent no-op fallback: if no connector is
//! available the session stays in its connecting state and says so, rather
//! than pretending to tune against nothing.
//!
//! ## Contract
//!
//! Every method must be non-blocking or bounded by a timeout. A timed-out
//! read is "no new data this tick", never an error: the orchestrator's
//! poll loop must keep its cadence no matter what the network does.

use std::collections::{HashMap, VecDeque};

use crate::errors::TelemetryError;
use crate::shot::RawShotReading;

/// Bit-exact key paths the engine relies on
pub mod keys {
    /// Shot hit flag
    pub const SHOT_HIT: &str = "/FiringSolver/Hit";
    /// Shot distance
    pub const SHOT_DISTANCE: &str = "/FiringSolver/Distance";
    /// Solution pitch angle, radians
    pub const SOLUTION_ANGLE: &str = "/FiringSolver/Solution/pitchRadians";
    /// Solution exit velocity
    pub const SOLUTION_VELOCITY: &str = "/FiringSolver/Solution/exitVelocity";
    /// Tuner status message for driver feedback
    pub const TUNER_STATUS: &str = "/FiringSolver/TunerStatus";
    /// Match-mode flag; nonzero means a match is active
    pub const MATCH_MODE: &str = "/FMSInfo/FMSControlData";
    /// Prefix under which coefficient values are published
    pub const COEFFICIENT_PREFIX: &str = "/Tuning/FiringSolver/";
}

/// Fallback address when no team identifier is configured
pub const FALLBACK_ADDRESS: &str = "127.0.0.1";

/// Derive the telemetry server address from a team identifier
///
/// Team number `TEAM` maps to `10.TE.AM.2` by splitting off the last two
/// digits: team `1234` becomes `10.12.34.2` and team `12345` becomes
/// `10.123.45.2`. Team `0` (unconfigured) falls back to the local address.
pub fn team_server_address(team: u32) -> String {
    if team == 0 {
        return FALLBACK_ADDRESS.to_string();
    }

    format!("10.{}.{}.2", team / 100, team % 100)
}

/// Capability the tuning engine needs from the telemetry transport
pub trait TelemetryConnector {
    /// Establish a connection, bounded by the transport's connect timeout
    fn connect(&mut self, address: &str) -> Result<(), TelemetryError>;

    /// Whether the connection is currently up
    fn is_connected(&self) -> bool;

    /// Latest shot reading, if one is waiting; `None` on no data or timeout
    fn read_shot(&mut self) -> Option<RawShotReading>;

    /// Read a coefficient value, falling back to `default` when absent
    fn read_coefficient(&mut self, key: &str, default: f64) -> f64;

    /// Publish a coefficient value
    fn write_coefficient(&mut self, key: &str, value: f64) -> Result<(), TelemetryError>;

    /// Whether competition match mode is active
    fn is_match_mode(&mut self) -> bool;

    /// Publish a human-readable status message; best-effort
    fn write_status(&mut self, message: &str);
}

/// Deterministic in-memory connector for tests
///
/// Fully scriptable: queue shots, toggle match mode, drop the connection,
/// or make writes fail, then inspect everything the engine wrote.
#[derive(Debug, Default)]
pub struct InMemoryConnector {
    values: HashMap<String, f64>,
    shots: VecDeque<RawShotReading>,
    statuses: Vec<String>,
    coefficient_writes: Vec<(String, f64)>,
    connected: bool,
    refuse_connect: bool,
    fail_writes: bool,
    match_mode: bool,
    connect_attempts: usize,
}

impl InMemoryConnector {
    /// A connector that accepts the next `connect` call
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a shot reading for the engine to pick up
    pub fn push_shot(&mut self, shot: RawShotReading) {
        self.shots.push_back(shot);
    }

    /// Toggle competition match mode
    pub fn set_match_mode(&mut self, active: bool) {
        self.match_mode = active;
    }

    /// Whether future `connect` calls should be refused
    pub fn set_refuse_connect(&mut self, refuse: bool) {
        self.refuse_connect = refuse;
    }

    /// Simulate a connection drop
    pub fn drop_connection(&mut self) {
        self.connected = false;
    }

    /// Whether coefficient writes should fail
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Current value at a key, if one was ever written or seeded
    pub fn value(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Seed a key's value directly
    pub fn set_value(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), value);
    }

    /// Every status message published, in order
    pub fn statuses(&self) -> &[String] {
        &self.statuses
    }

    /// Every successful coefficient write, in order
    pub fn coefficient_writes(&self) -> &[(String, f64)] {
        &self.coefficient_writes
    }

    /// How many times `connect` was called
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts
    }
}

impl TelemetryConnector for InMemoryConnector {
    fn connect(&mut self, address: &str) -> Result<(), TelemetryError> {
        self.connect_attempts += 1;
        if self.refuse_connect {
            return Err(TelemetryError::ConnectFailed {
                address: address.to_string(),
                reason: "refused by test script".into(),
            });
        }
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn read_shot(&mut self) -> Option<RawShotReading> {
        if !self.connected {
            return None;
        }
        self.shots.pop_front()
    }

    fn read_coefficient(&mut self, key: &str, default: f64) -> f64 {
        if !self.connected {
            return default;
        }
        self.values.get(key).copied().unwrap_or(default)
    }

    fn write_coefficient(&mut self, key: &str, value: f64) -> Result<(), TelemetryError> {
        if !self.connected {
            return Err(TelemetryError::NotConnected);
        }
        if self.fail_writes {
            return Err(TelemetryError::Timeout);
        }
        self.values.insert(key.to_string(), value);
        self.coefficient_writes.push((key.to_string(), value));
        Ok(())
    }

    fn is_match_mode(&mut self) -> bool {
        self.connected && self.match_mode
    }

    fn write_status(&mut self, message: &str) {
        if self.connected {
            self.statuses.push(message.to_string());
        }
    }
}
