//! Start and shutdown of a populated container.

use std::fmt;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::container::{ComponentContainer, ContainerError};

/// Where the container is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unstarted,
    /// Starting the startable at this position.
    Starting(usize),
    Started,
    /// The startable at this position failed; later ones were never started.
    FailedAt(usize),
    Preparing,
    /// Drain attempt number (1-based).
    Draining(u32),
    Stopping,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Unstarted => f.write_str("unstarted"),
            LifecycleState::Starting(i) => write!(f, "starting (#{i})"),
            LifecycleState::Started => f.write_str("started"),
            LifecycleState::FailedAt(i) => write!(f, "failed at start (#{i})"),
            LifecycleState::Preparing => f.write_str("preparing to stop"),
            LifecycleState::Draining(n) => write!(f, "draining (attempt {n})"),
            LifecycleState::Stopping => f.write_str("stopping"),
            LifecycleState::Stopped => f.write_str("stopped"),
        }
    }
}

/// How long shutdown waits for components to become ready to stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DrainPolicy {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub max_attempts: u32,
    /// Attempts numbered above this log every component still not ready.
    pub warn_after: u32,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 10,
            warn_after: 3,
        }
    }
}

/// Outcome of `shutdown_components`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every stoppable reported ready within the attempt budget.
    pub drained: bool,
    /// Drain polls performed.
    pub attempts: u32,
    /// Components whose `stop` returned an error.
    pub failed: Vec<String>,
}

impl ComponentContainer {
    /// Start every `Startable` in registration order, stopping at the first failure.
    ///
    /// Components already started are left running; the caller decides whether
    /// to shut down.
    pub fn start_components(&self) -> Result<(), ContainerError> {
        {
            let mut state = self.state.lock();
            if *state != LifecycleState::Unstarted {
                return Err(ContainerError::InvalidState {
                    operation: "start components",
                    state: *state,
                });
            }
            *state = LifecycleState::Starting(0);
        }

        tracing::info!("Phase: start");
        for (position, (name, startable)) in self.startable.iter().enumerate() {
            *self.state.lock() = LifecycleState::Starting(position);
            tracing::debug!(component = %name, "Starting component");
            if let Err(source) = startable.start_component() {
                *self.state.lock() = LifecycleState::FailedAt(position);
                return Err(ContainerError::Start {
                    component: name.clone(),
                    source,
                });
            }
        }

        *self.state.lock() = LifecycleState::Started;
        tracing::info!(started = self.startable.len(), "All components started");
        Ok(())
    }

    /// Prepare, drain, then stop every `Stoppable`.
    ///
    /// Only the first call does anything; later or concurrent calls get
    /// `ShutdownInProgress`. Drain timeouts and stop errors are logged and
    /// reported, never returned as errors.
    pub fn shutdown_components(&self) -> Result<ShutdownReport, ContainerError> {
        if self
            .shutdown_gate
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ContainerError::ShutdownInProgress);
        }

        tracing::info!("Phase: prepare to stop");
        *self.state.lock() = LifecycleState::Preparing;
        for (name, stoppable) in &self.stoppable {
            tracing::debug!(component = %name, "Preparing component to stop");
            stoppable.prepare_to_stop();
        }

        tracing::info!("Phase: drain");
        let (drained, attempts) = self.drain_stoppable();

        tracing::info!("Phase: stop");
        *self.state.lock() = LifecycleState::Stopping;
        let mut failed = Vec::new();
        for (name, stoppable) in &self.stoppable {
            tracing::debug!(component = %name, "Stopping component");
            if let Err(err) = stoppable.stop() {
                tracing::warn!(component = %name, error = %err, "Failed to stop component");
                failed.push(name.clone());
            }
        }

        *self.state.lock() = LifecycleState::Stopped;
        tracing::info!(drained, attempts, failed = failed.len(), "Shutdown complete");
        Ok(ShutdownReport {
            drained,
            attempts,
            failed,
        })
    }

    fn drain_stoppable(&self) -> (bool, u32) {
        let policy = &self.drain;
        if self.stoppable.is_empty() {
            return (true, 0);
        }

        for attempt in 1..=policy.max_attempts {
            *self.state.lock() = LifecycleState::Draining(attempt);

            let mut all_ready = true;
            for (name, stoppable) in &self.stoppable {
                let readiness = stoppable.ready_to_stop();
                if readiness.is_ready() {
                    continue;
                }
                all_ready = false;
                if attempt > policy.warn_after {
                    match readiness.reason() {
                        Some(reason) => tracing::warn!(
                            component = %name,
                            attempt,
                            reason,
                            "Component not ready to stop"
                        ),
                        None => {
                            tracing::warn!(component = %name, attempt, "Component not ready to stop")
                        }
                    }
                }
            }

            if all_ready {
                tracing::debug!(attempt, "All components ready to stop");
                return (true, attempt);
            }
            if attempt < policy.max_attempts {
                std::thread::sleep(policy.interval);
            }
        }

        tracing::error!(
            severity = "fatal",
            attempts = policy.max_attempts,
            "Components still not ready to stop; stopping anyway"
        );
        (false, policy.max_attempts)
    }
}
