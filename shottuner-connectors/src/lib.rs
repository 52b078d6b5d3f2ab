//! Network telemetry for ShotTuner
//!
//! ## Overview
//!
//! This crate is the wire-facing half of ShotTuner. The tuning engine in
//! `shottuner-core` only knows the `TelemetryConnector` capability; here
//! that capability is implemented over a real socket, plus the `shot-tuner`
//! runner binary that wires everything together.
//!
//! ## Protocol
//!
//! The robot-side table server speaks a line-oriented text protocol over
//! TCP, one request per line, one reply per request:
//!
//! ```text
//! -> GET /FiringSolver/Distance
//! <- VAL /FiringSolver/Distance 4.25        (key present)
//! <- NIL                                    (key absent)
//!
//! -> SET /Tuning/FiringSolver/DragCoefficient 0.0035
//! <- OK
//! ```
//!
//! Values travel as text and are parsed at the client, so the same `SET`
//! carries both coefficient numbers and status strings.
//!
//! ## Timeouts
//!
//! Every socket operation is bounded: connects by the connect timeout,
//! reads and writes by their own timeouts. The tuning loop polls at a
//! fixed cadence and a stalled server must read as "no data this tick",
//! never as a hang.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod ntio;

pub use ntio::{NtClient, NtConfig, NtError};

/// Connection statistics tracked by the wire client
#[derive(Debug, Default, Clone)]
pub struct ConnectionStats {
    /// Successful key reads
    pub reads: u64,
    /// Successful key writes
    pub writes: u64,
    /// Failed requests of any kind
    pub failures: u64,
    /// Connections established after the first
    pub reconnections: u32,
    /// Last error message, if any request ever failed
    pub last_error: Option<String>,
}
