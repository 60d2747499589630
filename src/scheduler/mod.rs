// Fixed-period tick loop and the handle renderers use to reach it

mod metrics;

pub use metrics::{MetricsSnapshot, SchedulerMetrics};

use crate::alert::StandingChange;
use crate::clock::Clock;
use crate::model::Model;
use crate::snapshot::Snapshot;
use crate::state::{Entity, ManualAction, OverrideError, StateEngine};
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

/// Buffered snapshots per broadcast subscriber before it starts lagging
const BROADCAST_CAPACITY: usize = 64;

const COMMAND_CAPACITY: usize = 32;

/// Requests served by the scheduler task between ticks
enum Command {
    Override {
        entity_id: String,
        action: ManualAction,
        reply: oneshot::Sender<Result<Entity, OverrideError>>,
    },
    Step {
        reply: oneshot::Sender<Arc<Snapshot>>,
    },
}

/// Owns the only mutable simulation state.
///
/// One tick runs at a time: ticks, overrides and steps are all served from
/// the same task, so each one sees the snapshot the previous one produced.
pub struct TickScheduler {
    engine: StateEngine,
    rng: StdRng,
    clock: Arc<dyn Clock>,
    period: Duration,
    current: Arc<Snapshot>,
    latest_tx: watch::Sender<Arc<Snapshot>>,
    updates_tx: broadcast::Sender<Arc<Snapshot>>,
    metrics: SchedulerMetrics,
}

impl TickScheduler {
    /// Create a scheduler seeded from the model (or from entropy when the
    /// model has no seed) and publish the tick-0 snapshot.
    pub fn new(model: Arc<Model>, clock: Arc<dyn Clock>) -> Self {
        let rng = match model.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(model, rng, clock)
    }

    pub fn with_rng(model: Arc<Model>, mut rng: StdRng, clock: Arc<dyn Clock>) -> Self {
        let period = model.tick_period;
        let engine = StateEngine::new(model);
        let current = Arc::new(engine.initial(&mut rng, clock.as_ref()));
        let (latest_tx, _) = watch::channel(Arc::clone(&current));
        let (updates_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        Self {
            engine,
            rng,
            clock,
            period,
            current,
            latest_tx,
            updates_tx,
            metrics: SchedulerMetrics::new(),
        }
    }

    pub fn current(&self) -> &Arc<Snapshot> {
        &self.current
    }

    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.metrics
    }

    /// Run one tick and publish the resulting snapshot
    pub fn tick(&mut self) -> Arc<Snapshot> {
        let started = Instant::now();
        let outcome = self
            .engine
            .advance(&self.current, &mut self.rng, self.clock.as_ref());

        if outcome.standing_change == Some(StandingChange::Raised) {
            self.metrics.record_standing_raised();
        }
        self.metrics.record_tick(
            outcome.transitions.len(),
            outcome.fired.len(),
            started.elapsed().as_micros() as u64,
        );

        self.publish(Arc::new(outcome.snapshot))
    }

    /// Apply a manual override to the current snapshot.
    ///
    /// Accepted overrides publish a new snapshot with the same tick number.
    pub fn apply_override(
        &mut self,
        entity_id: &str,
        action: ManualAction,
    ) -> Result<Entity, OverrideError> {
        let result = self.engine.apply_override(
            &self.current,
            entity_id,
            action,
            &mut self.rng,
            self.clock.as_ref(),
        );

        match result {
            Ok(outcome) => {
                self.metrics.record_override(true);
                if outcome.standing_change == Some(StandingChange::Raised) {
                    self.metrics.record_standing_raised();
                }
                self.publish(Arc::new(outcome.snapshot));
                Ok(outcome.entity)
            }
            Err(e) => {
                self.metrics.record_override(false);
                warn!(
                    entity_id = %entity_id,
                    action = %action,
                    error = %e,
                    "Manual override rejected"
                );
                Err(e)
            }
        }
    }

    fn publish(&mut self, snapshot: Arc<Snapshot>) -> Arc<Snapshot> {
        self.current = Arc::clone(&snapshot);
        self.latest_tx.send_replace(Arc::clone(&snapshot));
        // No subscribers is fine
        let _ = self.updates_tx.send(Arc::clone(&snapshot));
        snapshot
    }

    /// Starts the tick loop (non-blocking).
    ///
    /// Returns the handle renderers use plus the task's JoinHandle, which
    /// completes after `SchedulerHandle::shutdown` or once every handle is
    /// dropped.
    pub fn start(self) -> (SchedulerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = SchedulerHandle {
            commands: command_tx,
            latest: self.latest_tx.subscribe(),
            updates: self.updates_tx.clone(),
            metrics: self.metrics.clone(),
            shutdown: Arc::new(shutdown_tx),
        };

        let task = tokio::spawn(self.run(command_rx, shutdown_rx));
        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            period_ms = self.period.as_millis() as u64,
            entities = self.current.entities.len(),
            readings = self.current.readings.len(),
            "Tick scheduler started"
        );

        let mut ticker = interval(self.period);
        // Skip missed ticks to prevent backlog under load
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Consume the immediate first tick; tick 0 is already published
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }

                Some(command) = commands.recv() => {
                    self.handle_command(command);
                }

                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            tick = self.current.tick,
            ticks_run = self.metrics.ticks(),
            "Tick scheduler stopped"
        );
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Override {
                entity_id,
                action,
                reply,
            } => {
                let result = self.apply_override(&entity_id, action);
                // Requester may have gone away
                let _ = reply.send(result);
            }
            Command::Step { reply } => {
                let snapshot = self.tick();
                let _ = reply.send(snapshot);
            }
        }
    }
}

/// Cloneable access to a running scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    latest: watch::Receiver<Arc<Snapshot>>,
    updates: broadcast::Sender<Arc<Snapshot>>,
    metrics: SchedulerMetrics,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    /// Most recently published snapshot
    pub fn latest(&self) -> Arc<Snapshot> {
        self.latest.borrow().clone()
    }

    /// Receive every snapshot published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.updates.subscribe()
    }

    /// Watch channel that always holds the latest snapshot
    pub fn watch(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.latest.clone()
    }

    /// Queue a manual override; it is applied between ticks.
    pub async fn request_override(
        &self,
        entity_id: &str,
        action: ManualAction,
    ) -> Result<Entity, OverrideError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Override {
                entity_id: entity_id.to_string(),
                action,
                reply,
            })
            .await
            .map_err(|_| OverrideError::SchedulerStopped)?;
        response.await.map_err(|_| OverrideError::SchedulerStopped)?
    }

    /// Run one tick immediately, outside the regular period
    pub async fn step(&self) -> Result<Arc<Snapshot>> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Step { reply })
            .await
            .ok()
            .context("Tick scheduler is not running")?;
        response.await.context("Tick scheduler stopped during step")
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Shared counters, for components that record their own activity
    pub fn metrics_tracker(&self) -> &SchedulerMetrics {
        &self.metrics
    }

    /// Ask the scheduler to stop after the current tick
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}
