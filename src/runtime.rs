//! Controller thread: owns the bulb and processes commands via a channel.
//!
//! `BulbController` is deliberately not shared. One dedicated thread owns
//! it, so every command and every timer tick is applied one at a time. The
//! async HTTP server talks to this thread by sending `CommandRequest`
//! values through an `mpsc` channel and reads the latest snapshot from a
//! `watch` channel.
//!
//! ## Rust concepts
//! - `std::sync::mpsc` channels for thread communication
//! - `recv_timeout()` to wait for either a command or the next timer deadline
//! - `tokio::sync::oneshot` to hand a result back to an async caller
//! - `tokio::sync::watch` so readers always see the latest value
//! - `Box<dyn Trait>` for a pluggable storage backend

use crate::BulbConfig;
use crate::bulb::{BulbController, StateSnapshot};
use crate::persistence::{PersistedBulb, SnapshotStore};
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};

// ── Commands ─────────────────────────────────────────────────────────

/// Commands sent from the HTTP server (or any other front end) to the
/// controller thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BulbCommand {
    TogglePower,
    /// Raw brightness input; clamped by the controller
    SetBrightness(i64),
    Reset,
    StartAutoCycle,
    StopAutoCycle,
    /// Save state one last time and stop the thread
    Shutdown,
}

/// A command plus an optional channel for the resulting snapshot.
pub struct CommandRequest {
    pub command: BulbCommand,
    pub reply: Option<oneshot::Sender<StateSnapshot>>,
}

impl CommandRequest {
    /// Build a request whose caller wants the resulting snapshot back.
    pub fn new(command: BulbCommand) -> (Self, oneshot::Receiver<StateSnapshot>) {
        let (reply, rx) = oneshot::channel();
        let request = Self {
            command,
            reply: Some(reply),
        };
        (request, rx)
    }

    pub fn without_reply(command: BulbCommand) -> Self {
        Self {
            command,
            reply: None,
        }
    }
}

// ── Tick schedule ────────────────────────────────────────────────────

/// Timer ticks that came due since the last check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DueTicks {
    /// Number of runtime periods that elapsed
    pub runtime: u64,
    pub auto_cycle: bool,
}

/// Deadline bookkeeping for the two periodic timers.
///
/// Pure with respect to time: callers pass `now` in, so tests can feed
/// synthetic instants instead of sleeping.
#[derive(Clone, Copy, Debug)]
pub struct TickSchedule {
    runtime_period: Duration,
    cycle_period: Duration,
    next_runtime: Instant,
    next_cycle: Option<Instant>,
}

impl TickSchedule {
    pub fn new(config: &BulbConfig, now: Instant) -> Self {
        let runtime_period = Duration::from_secs(config.runtime_tick_seconds());
        Self {
            runtime_period,
            cycle_period: config.auto_cycle_interval.max(Duration::from_millis(1)),
            next_runtime: now + runtime_period,
            next_cycle: None,
        }
    }

    /// Begin auto-cycle ticks one period from `now`. Already running: no change.
    pub fn start_cycle(&mut self, now: Instant) {
        if self.next_cycle.is_none() {
            self.next_cycle = Some(now + self.cycle_period);
        }
    }

    pub fn stop_cycle(&mut self) {
        self.next_cycle = None;
    }

    pub fn cycle_running(&self) -> bool {
        self.next_cycle.is_some()
    }

    pub fn next_deadline(&self) -> Instant {
        match self.next_cycle {
            Some(cycle) => cycle.min(self.next_runtime),
            None => self.next_runtime,
        }
    }

    /// Collect everything due at `now` and move the deadlines forward.
    ///
    /// Every missed runtime period is counted so metering stays accurate.
    /// Missed auto-cycle ticks collapse into a single step.
    pub fn due(&mut self, now: Instant) -> DueTicks {
        let mut ticks = DueTicks::default();

        while self.next_runtime <= now {
            ticks.runtime += 1;
            self.next_runtime += self.runtime_period;
        }

        if let Some(next) = self.next_cycle {
            if next <= now {
                ticks.auto_cycle = true;
                let following = next + self.cycle_period;
                self.next_cycle = Some(if following <= now {
                    now + self.cycle_period
                } else {
                    following
                });
            }
        }

        ticks
    }
}

// ── Controller state ─────────────────────────────────────────────────

/// The bulb plus everything the thread needs to publish and persist it.
pub struct BulbRuntime {
    bulb: BulbController,
    store: Box<dyn SnapshotStore>,
    snapshots: watch::Sender<StateSnapshot>,
    last_saved: Option<PersistedBulb>,
    runtime_tick_seconds: u64,
}

impl BulbRuntime {
    pub fn new(
        bulb: BulbController,
        store: Box<dyn SnapshotStore>,
        snapshots: watch::Sender<StateSnapshot>,
        config: &BulbConfig,
    ) -> Self {
        snapshots.send_replace(bulb.snapshot());
        Self {
            bulb,
            store,
            snapshots,
            last_saved: None,
            runtime_tick_seconds: config.runtime_tick_seconds(),
        }
    }

    pub fn bulb(&self) -> &BulbController {
        &self.bulb
    }

    /// Apply one command and publish the result if anything changed.
    pub fn apply(&mut self, command: BulbCommand) -> StateSnapshot {
        let before = self.bulb.revision();
        let snapshot = match command {
            BulbCommand::TogglePower => self.bulb.toggle_power(),
            BulbCommand::SetBrightness(value) => self.bulb.set_brightness(value),
            BulbCommand::Reset => self.bulb.reset_to_default(),
            BulbCommand::StartAutoCycle => self.bulb.start_auto_cycle(),
            BulbCommand::StopAutoCycle => self.bulb.stop_auto_cycle(),
            BulbCommand::Shutdown => self.bulb.snapshot(),
        };
        self.commit(before);
        snapshot
    }

    /// Apply the ticks that came due.
    pub fn apply_ticks(&mut self, ticks: DueTicks) {
        let before = self.bulb.revision();
        if ticks.runtime > 0 {
            self.bulb.tick(ticks.runtime.saturating_mul(self.runtime_tick_seconds));
        }
        if ticks.auto_cycle {
            self.bulb.auto_cycle_tick();
        }
        self.commit(before);
    }

    /// Write the durable subset if it differs from what was last saved.
    /// Failures are logged and otherwise ignored.
    pub fn persist(&mut self) {
        let record = self.bulb.persisted();
        if self.last_saved == Some(record) {
            return;
        }
        match self.store.save(&record) {
            Ok(()) => self.last_saved = Some(record),
            Err(e) => tracing::warn!("Could not save bulb state, continuing in memory: {}", e),
        }
    }

    fn commit(&mut self, before: u64) {
        if self.bulb.revision() == before {
            return;
        }
        self.snapshots.send_replace(self.bulb.snapshot());
        self.persist();
    }
}

// ── Controller loop ──────────────────────────────────────────────────

/// Main controller loop, runs on a dedicated thread and owns the bulb.
///
/// Returns when a `Shutdown` command arrives or every sender is dropped.
/// Either way the durable subset is saved one last time.
pub fn controller_loop(rx: Receiver<CommandRequest>, mut runtime: BulbRuntime, config: BulbConfig) {
    let mut schedule = TickSchedule::new(&config, Instant::now());

    tracing::info!("Bulb controller started, waiting for commands...");

    loop {
        let timeout = schedule
            .next_deadline()
            .saturating_duration_since(Instant::now());

        match rx.recv_timeout(timeout) {
            Ok(CommandRequest { command, reply }) => {
                let snapshot = runtime.apply(command);
                tracing::info!(
                    ?command,
                    is_on = snapshot.is_on,
                    brightness = snapshot.brightness,
                    "Command applied"
                );

                if let Some(reply) = reply {
                    // The caller may have given up waiting; nothing to do then
                    let _ = reply.send(snapshot);
                }

                if command == BulbCommand::Shutdown {
                    tracing::info!("Bulb controller: shutdown requested.");
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("Bulb controller: channel closed, shutting down.");
                break;
            }
        }

        let now = Instant::now();
        if runtime.bulb().state().auto_cycle_active {
            schedule.start_cycle(now);
        } else {
            schedule.stop_cycle();
        }

        // Checked after every wake-up so a steady stream of commands
        // cannot starve the timers.
        runtime.apply_ticks(schedule.due(now));
    }

    runtime.persist();
}

// ── Spawning ─────────────────────────────────────────────────────────

/// Handles for talking to a running controller thread.
pub struct ControllerHandle {
    pub commands: Sender<CommandRequest>,
    pub snapshots: watch::Receiver<StateSnapshot>,
    pub thread: JoinHandle<()>,
}

impl ControllerHandle {
    /// Ask the thread to save and stop, then wait for it.
    pub fn shutdown(self) {
        let _ = self
            .commands
            .send(CommandRequest::without_reply(BulbCommand::Shutdown));
        if self.thread.join().is_err() {
            tracing::error!("Bulb controller thread panicked");
        }
    }
}

/// Start a controller thread for `bulb`.
pub fn spawn_controller(
    bulb: BulbController,
    store: Box<dyn SnapshotStore>,
    config: BulbConfig,
) -> io::Result<ControllerHandle> {
    let (tx, rx) = mpsc::channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(bulb.snapshot());
    let runtime = BulbRuntime::new(bulb, store, snapshot_tx, &config);

    let thread = thread::Builder::new()
        .name("bulb-controller".to_string())
        .spawn(move || controller_loop(rx, runtime, config))?;

    Ok(ControllerHandle {
        commands: tx,
        snapshots: snapshot_rx,
        thread,
    })
}

// ── Tests ────────────────────────────────────────────────────────────
