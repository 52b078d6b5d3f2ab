//! Tuning Orchestrator
//!
//! ## Overview
//!
//! The orchestrator sequences per-coefficient optimizers across the enabled
//! coefficient list and owns every piece of session state. It runs as a
//! single cooperative control loop: [`Orchestrator::tick`] advances exactly
//! one poll step and never blocks, [`Orchestrator::run`] calls it at the
//! configured poll rate. No other thread mutates the session: the
//! connector is handed in by reference each tick, so tests drive the whole
//! machine with an in-memory fake and a hand-cranked clock.
//!
//! ## State machine
//!
//! ```text
//! Idle → Connecting → SelectingCoefficient → Optimizing ─┬→ Paused ─┐
//!            ↑              │        ↑           │       │          │
//!            │              ↓        └───────────┘       └──────────┘
//!            │          Completed          (phase done)   (match over)
//!            └── (connection lost, from any non-terminal state)
//! ```
//!
//! `Completed` and `Aborted` are terminal. `Aborted` is reached only by
//! explicit cancellation; connection loss alone is never fatal, and the
//! session drops back to `Connecting` and retries at a throttled interval.
//!
//! ## Write discipline
//!
//! Nothing is written while disconnected, nothing is written while match
//! mode is active, and a finished phase's value is never dropped: if the
//! commit write fails, it is held as a pending commit and flushed right
//! after the next successful reconnect, before any new phase starts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{info, warn};

use crate::clock::{Clock, SystemClock, Timestamp};
use crate::coefficients::CoefficientSpec;
use crate::config::TunerConfig;
use crate::errors::ConfigError;
use crate::optimizer::{CoefficientTuner, PhaseOutcome};
use crate::status::StatusReporter;
use crate::telemetry::TelemetryConnector;
use crate::validator::ShotValidator;

/// Where the session currently is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No connector attached yet
    Idle,
    /// Trying to reach the telemetry server
    Connecting,
    /// Advancing to the next enabled coefficient
    SelectingCoefficient,
    /// Actively feeding shots to the current coefficient's optimizer
    Optimizing,
    /// Suspended while competition match mode is active
    Paused,
    /// Every enabled coefficient has been tuned; terminal
    Completed,
    /// Cancelled by the operator; terminal
    Aborted,
}

impl Phase {
    /// Whether the session can make no further progress
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Aborted)
    }
}

/// A committed value whose bus write has not yet succeeded
#[derive(Debug, Clone)]
struct PendingCommit {
    name: String,
    key: String,
    value: f64,
}

/// Top-level session state: what is tuned, what was accepted
#[derive(Debug)]
pub struct TuningSession {
    ordered: Vec<CoefficientSpec>,
    active_index: usize,
    accepted: BTreeMap<String, f64>,
    failed: Vec<String>,
}

impl TuningSession {
    fn new(config: &TunerConfig) -> Self {
        Self {
            ordered: config.enabled_in_order(),
            active_index: 0,
            accepted: BTreeMap::new(),
            failed: Vec::new(),
        }
    }

    /// Committed values by coefficient name
    pub fn accepted_values(&self) -> &BTreeMap<String, f64> {
        &self.accepted
    }

    /// Names of coefficients whose phases aborted
    pub fn failed_coefficients(&self) -> &[String] {
        &self.failed
    }
}

/// The single cooperative control loop driving a tuning session
pub struct Orchestrator {
    config: TunerConfig,
    session: TuningSession,
    phase: Phase,
    validator: ShotValidator,
    tuner: Option<CoefficientTuner>,
    reporter: StatusReporter,
    pending_commit: Option<PendingCommit>,
    last_connect_attempt: Option<Timestamp>,
    address: String,
}

impl Orchestrator {
    /// Build an orchestrator; fails fast on malformed configuration
    pub fn new(config: TunerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let session = TuningSession::new(&config);
        let validator = ShotValidator::new(
            config.debounce_ms,
            config.outlier_threshold_sigma,
            config.min_samples_for_stats,
        );
        let address = config.resolve_address();

        Ok(Self {
            config,
            session,
            phase: Phase::Idle,
            validator,
            tuner: None,
            reporter: StatusReporter,
            pending_commit: None,
            last_connect_attempt: None,
            address,
        })
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The session's accumulated results
    pub fn session(&self) -> &TuningSession {
        &self.session
    }

    /// Advance the state machine by one poll step; never blocks
    pub fn tick(&mut self, conn: &mut dyn TelemetryConnector, clock: &dyn Clock) {
        match self.phase {
            Phase::Idle => {
                info!("tuning session starting, server {}", self.address);
                self.phase = Phase::Connecting;
            }
            Phase::Connecting => self.tick_connecting(conn, clock),
            Phase::SelectingCoefficient => self.tick_selecting(conn),
            Phase::Optimizing => self.tick_optimizing(conn),
            Phase::Paused => self.tick_paused(conn),
            Phase::Completed | Phase::Aborted => {}
        }
    }

    /// Run to completion at the configured poll rate
    ///
    /// Returns the terminal phase. A raised `cancel` flag triggers the
    /// graceful-shutdown path and ends the session as `Aborted`.
    pub fn run(&mut self, conn: &mut dyn TelemetryConnector, cancel: &AtomicBool) -> Phase {
        let clock = SystemClock;
        let period = Duration::from_millis(self.config.poll_period_ms());

        while !self.phase.is_terminal() {
            if cancel.load(Ordering::Relaxed) {
                self.cancel(conn, &clock);
                break;
            }

            self.tick(conn, &clock);

            if !self.phase.is_terminal() {
                std::thread::sleep(period);
            }
        }

        self.phase
    }

    /// Gracefully cancel the session
    ///
    /// Resolves the in-flight coefficient (committing its best value when
    /// the phase already has enough observations, reverting it otherwise)
    /// within the bounded shutdown window, then ends the session. Operator
    /// cancellation is a normal terminal transition, not an error.
    pub fn cancel(&mut self, conn: &mut dyn TelemetryConnector, clock: &dyn Clock) {
        let deadline = clock.now().saturating_add(self.config.graceful_shutdown_ms);

        if let Some(tuner) = self.tuner.take() {
            let spec = tuner.spec().clone();
            let resolved = if tuner.has_min_evidence() {
                tuner.best().map(|(value, _)| value)
            } else {
                None
            };

            let value = resolved.unwrap_or_else(|| tuner.fallback_value());
            if resolved.is_some() {
                self.session.accepted.insert(spec.name.clone(), value);
                info!("cancel: committing in-flight {} = {}", spec.name, value);
            } else {
                info!("cancel: reverting in-flight {} to {}", spec.name, value);
            }

            // One bounded attempt; shutdown proceeds regardless
            if let Err(e) = conn.write_coefficient(&spec.key, value) {
                warn!("cancel: final write for {} failed: {e}", spec.name);
            }

            if clock.now() > deadline {
                warn!("graceful-shutdown window elapsed, shutting down anyway");
            }
        }

        self.reporter.cancelled(conn);
        self.phase = Phase::Aborted;
    }

    fn tick_connecting(&mut self, conn: &mut dyn TelemetryConnector, clock: &dyn Clock) {
        let now = clock.now();

        if !conn.is_connected() {
            if let Some(last) = self.last_connect_attempt {
                if now.saturating_sub(last) < self.config.reconnect_delay_ms {
                    return;
                }
            }

            self.last_connect_attempt = Some(now);
            if let Err(e) = conn.connect(&self.address) {
                warn!("connection attempt failed: {e}");
                return;
            }
            self.reporter.connected(conn, &self.address);
        }

        // A finished phase's value is flushed before anything else happens
        if let Some(pending) = self.pending_commit.take() {
            if let Err(e) = conn.write_coefficient(&pending.key, pending.value) {
                warn!("pending commit for {} still failing: {e}", pending.name);
                self.pending_commit = Some(pending);
                return;
            }
            self.reporter.committed(conn, &pending.name, pending.value);
        }

        self.phase = if self.tuner.is_some() {
            Phase::Optimizing
        } else {
            Phase::SelectingCoefficient
        };
    }

    fn tick_selecting(&mut self, conn: &mut dyn TelemetryConnector) {
        if !conn.is_connected() {
            self.phase = Phase::Connecting;
            return;
        }

        if self.session.active_index >= self.session.ordered.len() {
            self.reporter.completed(conn, self.session.accepted.len());
            self.phase = Phase::Completed;
            return;
        }

        let spec = self.session.ordered[self.session.active_index].clone();

        // Fresh validator statistics and a fresh optimizer per phase:
        // observations never leak across coefficients
        self.validator.reset();
        self.tuner = Some(CoefficientTuner::new(
            spec.clone(),
            self.config.n_initial_points,
            self.config.tuner_limits(),
        ));

        self.reporter.phase_started(conn, &spec.name);
        self.phase = Phase::Optimizing;
    }

    fn tick_optimizing(&mut self, conn: &mut dyn TelemetryConnector) {
        if !conn.is_connected() {
            warn!("connection lost while optimizing; state preserved");
            self.phase = Phase::Connecting;
            return;
        }

        // Match mode gates the entire tick: no proposals, no commits
        if conn.is_match_mode() {
            self.reporter.paused(conn);
            self.phase = Phase::Paused;
            return;
        }

        let Some(tuner) = self.tuner.as_mut() else {
            self.phase = Phase::SelectingCoefficient;
            return;
        };

        // Publish the active candidate so subsequent shots use it
        if tuner.current_proposal().is_none() {
            let proposal = tuner.propose();
            let key = tuner.spec().key.clone();
            if let Err(e) = conn.write_coefficient(&key, proposal) {
                // The candidate never reached the bus: withdraw it so it is
                // re-proposed and rewritten after recovery, instead of
                // silently collecting evidence for an unpublished value
                warn!("proposal write failed: {e}");
                tuner.withdraw_proposal();
                self.phase = Phase::Connecting;
                return;
            }
        }

        let mut progress: Option<(String, usize, f64)> = None;
        if let Some(raw) = conn.read_shot() {
            match self.validator.validate(&raw) {
                Ok(obs) => {
                    let loss = self.config.loss.loss(&obs);
                    tuner.observe(loss);
                    progress = Some((tuner.spec().name.clone(), tuner.iteration_count(), loss));
                }
                Err(rejection) if rejection.counts_as_invalid() => {
                    tuner.record_invalid();
                }
                Err(_) => {} // stale re-read, already counted
            }
        }

        let outcome = tuner.outcome();

        if let Some((name, iteration, loss)) = progress {
            self.reporter.progress(
                conn,
                &name,
                iteration,
                self.config.n_calls_per_coefficient,
                loss,
            );
        }

        if let Some(outcome) = outcome {
            self.finish_phase(conn, outcome);
        }
    }

    fn tick_paused(&mut self, conn: &mut dyn TelemetryConnector) {
        if !conn.is_connected() {
            self.phase = Phase::Connecting;
            return;
        }

        if !conn.is_match_mode() {
            self.reporter.resumed(conn);
            self.phase = Phase::Optimizing;
        }
    }

    /// Commit or revert the finished phase, then advance
    fn finish_phase(&mut self, conn: &mut dyn TelemetryConnector, outcome: PhaseOutcome) {
        let Some(tuner) = self.tuner.take() else {
            return;
        };
        let spec = tuner.spec().clone();

        // The committed value is the best observed point, never the
        // possibly-worse exploratory tail; an aborted phase reverts
        let best = tuner.best().filter(|_| outcome.is_success());

        let value = match best {
            Some((value, loss)) => {
                info!(
                    "{}: phase ended ({outcome:?}), best {} at loss {:.4}",
                    spec.name, value, loss
                );
                self.session.accepted.insert(spec.name.clone(), value);
                value
            }
            None => {
                let fallback = tuner.fallback_value();
                self.session.failed.push(spec.name.clone());
                self.reporter.aborted(conn, &spec.name, fallback);
                fallback
            }
        };

        self.session.active_index += 1;

        match conn.write_coefficient(&spec.key, value) {
            Ok(()) => {
                if best.is_some() {
                    self.reporter.committed(conn, &spec.name, value);
                }
                self.phase = Phase::SelectingCoefficient;
            }
            Err(e) => {
                // Never drop a tuned coefficient: hold the write and retry
                // once reconnected, before the next phase starts
                warn!("commit write for {} failed, holding as pending: {e}", spec.name);
                self.pending_commit = Some(PendingCommit {
                    name: spec.name,
                    key: spec.key,
                    value,
                });
                self.phase = Phase::Connecting;
            }
        }
    }
}
