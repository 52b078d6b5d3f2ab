//! Status reporting for driver feedback
//!
//! Thin formatting layer over `write_status`: every notable session event
//! becomes one short human-readable line on the telemetry bus and a mirror
//! entry in the process log. Nothing here affects tuning behavior.

use log::{info, warn};

use crate::telemetry::TelemetryConnector;

/// Publishes human-readable tuner progress
#[derive(Debug, Default)]
pub struct StatusReporter;

impl StatusReporter {
    /// Session came up and connected
    pub fn connected(&self, conn: &mut dyn TelemetryConnector, address: &str) {
        let msg = format!("Tuner connected to {address}");
        info!("{msg}");
        conn.write_status(&msg);
    }

    /// A coefficient's tuning phase began
    pub fn phase_started(&self, conn: &mut dyn TelemetryConnector, name: &str) {
        let msg = format!("Tuning {name}");
        info!("{msg}");
        conn.write_status(&msg);
    }

    /// One observation was incorporated
    pub fn progress(
        &self,
        conn: &mut dyn TelemetryConnector,
        name: &str,
        iteration: usize,
        budget: usize,
        loss: f64,
    ) {
        let msg = format!("Tuning {name}: shot {iteration}/{budget}, loss {loss:.4}");
        info!("{msg}");
        conn.write_status(&msg);
    }

    /// A coefficient value was committed
    pub fn committed(&self, conn: &mut dyn TelemetryConnector, name: &str, value: f64) {
        let msg = format!("Committed {name} = {value}");
        info!("{msg}");
        conn.write_status(&msg);
    }

    /// A phase aborted and the coefficient reverted
    pub fn aborted(&self, conn: &mut dyn TelemetryConnector, name: &str, fallback: f64) {
        let msg = format!("Aborted {name}: too many invalid shots, reverted to {fallback}");
        warn!("{msg}");
        conn.write_status(&msg);
    }

    /// Tuning suspended for match mode
    pub fn paused(&self, conn: &mut dyn TelemetryConnector) {
        let msg = "Tuning paused: match mode active";
        info!("{msg}");
        conn.write_status(msg);
    }

    /// Match over, tuning resumed
    pub fn resumed(&self, conn: &mut dyn TelemetryConnector) {
        let msg = "Tuning resumed";
        info!("{msg}");
        conn.write_status(msg);
    }

    /// All enabled coefficients are done
    pub fn completed(&self, conn: &mut dyn TelemetryConnector, tuned: usize) {
        let msg = format!("Tuning complete: {tuned} coefficients committed");
        info!("{msg}");
        conn.write_status(&msg);
    }

    /// Session cancelled by the operator
    pub fn cancelled(&self, conn: &mut dyn TelemetryConnector) {
        let msg = "Tuning cancelled";
        info!("{msg}");
        conn.write_status(msg);
    }
}
