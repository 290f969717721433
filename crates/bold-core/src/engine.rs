//! The simulation engine: lifecycle state machine and run orchestration.
//!
//! All state transitions happen inside one `tokio::sync::Mutex` around the
//! engine core, which is the only ordering primitive between scheduler
//! ticks, protocol-driven start signals and operator calls. The current
//! state is mirrored into a `watch` channel so HTTP handlers can read it
//! without taking the lock, and every realized transition is broadcast.
//!
//! Protocol requests served during a run hold a [`RequestPermit`]. Leaving
//! Running takes the exclusive side of the same gate, so every admitted
//! request completes before the run is sealed and the store restored.
//!
//! A run goes through:
//!
//! 1. **Initializing**: registration is closed and the engine waits for the
//!    start signal ([`SimulationEngine::start`] or a control write through
//!    [`SimulationEngine::start_with_control_write`]). On that signal it
//!    captures the live store as the run baseline, opens slot 0, loads the
//!    datasets and runs the single updates.
//! 2. **Ready** then **Running**: the scheduler ticks at the slot period.
//!    Each tick evaluates the termination predicate; if it holds the run
//!    moves to Replaying, otherwise both histories advance one slot and
//!    the continuous updates run.
//! 3. **Replaying**: the change history is replayed against a private store.
//! 4. **Cleaning**: histories are cleared, the live store is restored to the
//!    baseline, and the engine returns to Configured and re-arms to
//!    Initializing for the next run.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use bold_store::{AskProgram, GraphListener, GraphStore, QueryProgram, StoreError, UpdateProgram};
use bold_types::{Quad, RunId, SimulationState, Transition};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, OwnedRwLockReadGuard, RwLock, broadcast, watch};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::change_history::{ChangeHistory, HistoryError};
use crate::config::BoldConfig;
use crate::control::{ControlResource, INIT_PROGRAM, TICK_PROGRAM};
use crate::interaction_history::InteractionHistory;
use crate::registry::{ProgramKind, ProgramRegistry};
use crate::replay::{ReplayPlan, ReplayReport, query_sink_path, replay};
use crate::scheduler::{Scheduler, StopSignal, TickOutcome};
use crate::sink::{DirectorySinks, SinkProvider};

/// Capacity of the transition broadcast channel.
const TRANSITION_CHANNEL_CAPACITY: usize = 64;

/// File name of the interaction table inside a run directory.
pub const INTERACTIONS_FILE: &str = "interactions.tsv";

/// File name of the run manifest inside a run directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Run blocking work on the current task. On a multi-threaded runtime the
/// worker is handed over with `block_in_place` so other tasks keep running;
/// the current-thread runtime cannot do that and runs `work` inline.
fn off_the_executor<R>(work: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(work),
        _ => work(),
    }
}

/// Errors surfaced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A transition outside the fixed cycle was attempted.
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        /// Current state.
        from: SimulationState,
        /// Requested state.
        to: SimulationState,
    },

    /// Registration calls are only accepted while Configured.
    #[error("registration is closed (engine is {state})")]
    RegistrationClosed {
        /// Current state.
        state: SimulationState,
    },

    /// A run is already in progress.
    #[error("a run is already in progress (engine is {state})")]
    RunInProgress {
        /// Current state.
        state: SimulationState,
    },

    /// A query's result table would overwrite another run artifact.
    #[error("query {name} would write {file}, which another artifact already uses")]
    ArtifactCollision {
        /// The query being registered.
        name: String,
        /// The contested file inside the run directory.
        file: String,
    },

    /// The live store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// History bookkeeping failed.
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Engine settings derived from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Base IRI of graph resources.
    pub base_uri: String,
    /// Slot period.
    pub timeslot: Duration,
    /// Root directory of run artifacts.
    pub output_dir: PathBuf,
}

impl EngineSettings {
    /// Extract engine settings from the configuration.
    pub fn from_config(config: &BoldConfig) -> Self {
        Self {
            base_uri: config.server.base_uri(),
            timeslot: config.simulation.timeslot(),
            output_dir: config.simulation.output_dir.clone(),
        }
    }
}

/// Lock-free view of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    /// Current lifecycle state.
    pub state: SimulationState,
    /// Runs that went through cleanup.
    pub completed_runs: u64,
}

/// Result of [`SimulationEngine::start_with_control_write`].
#[derive(Debug)]
pub enum ControlStart<T, E> {
    /// The engine was awaiting the start signal; the write succeeded and the
    /// run is now Running.
    Started {
        /// Identifier of the new run.
        run_id: RunId,
        /// Value returned by the write.
        output: T,
    },
    /// The engine was awaiting the start signal but the write failed. The
    /// engine keeps waiting.
    Rejected(E),
    /// The engine was not awaiting a start signal; nothing was written.
    NotAwaiting(SimulationState),
}

/// Admission of one protocol request into a running simulation. The run
/// cannot leave Running while a permit is alive.
#[derive(Debug)]
pub struct RequestPermit {
    _gate: OwnedRwLockReadGuard<()>,
}

/// Summary of a completed run, also written as the run manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Run identifier.
    pub run_id: RunId,
    /// 1-based run number on this engine.
    pub run: u64,
    /// Ticks that advanced the slot.
    pub ticks: u64,
    /// Slots recorded (`ticks + 1`).
    pub timeslots: usize,
    /// When the start signal was accepted.
    pub started_at: DateTime<Utc>,
    /// When replay finished.
    pub ended_at: DateTime<Utc>,
    /// Run directory, relative to the output root.
    pub output_dir: PathBuf,
    /// Replay counters.
    pub replay: ReplayReport,
}

struct Dataset {
    name: String,
    quads: Vec<Quad>,
}

struct RunContext {
    run_id: RunId,
    run: u64,
    started_at: DateTime<Utc>,
    ticks: u64,
    baseline: Vec<Quad>,
}

struct EngineCore {
    state: SimulationState,
    programs: ProgramRegistry,
    datasets: Vec<Dataset>,
    predicate: Arc<dyn AskProgram>,
    dump_pattern: Option<String>,
    run: Option<RunContext>,
    completed_runs: u64,
    last_run: Option<RunSummary>,
}

/// Publishes realized transitions.
struct Publisher {
    status: watch::Sender<EngineStatus>,
    transitions: broadcast::Sender<Transition>,
}

impl Publisher {
    fn transition(&self, core: &mut EngineCore, to: SimulationState) -> Result<(), EngineError> {
        let from = core.state;
        if !from.can_transition_to(to) {
            error!(%from, %to, "Illegal state transition");
            return Err(EngineError::IllegalTransition { from, to });
        }
        core.state = to;
        self.status.send_replace(EngineStatus {
            state: to,
            completed_runs: core.completed_runs,
        });
        // No subscriber is not an error.
        self.transitions.send(Transition { from, to }).ok();
        debug!(%from, %to, "State transition");
        Ok(())
    }
}

struct RunDriver {
    stop: StopSignal,
    handle: JoinHandle<()>,
}

struct Shared {
    store: Arc<dyn GraphStore>,
    settings: EngineSettings,
    control: ControlResource,
    sinks: Arc<dyn SinkProvider>,
    changes: Arc<ChangeHistory>,
    interactions: Arc<InteractionHistory>,
    publisher: Publisher,
    core: Mutex<EngineCore>,
    requests: Arc<RwLock<()>>,
    driver: std::sync::Mutex<Option<RunDriver>>,
}

/// Handle to the simulation engine. Cheap to clone.
#[derive(Clone)]
pub struct SimulationEngine {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SimulationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationEngine")
            .field("status", &self.status())
            .field("settings", &self.shared.settings)
            .finish_non_exhaustive()
    }
}

impl SimulationEngine {
    /// Create an engine over the live `store`, writing artifacts below
    /// `settings.output_dir`.
    pub fn new(store: Arc<dyn GraphStore>, settings: EngineSettings) -> Self {
        let sinks = Arc::new(DirectorySinks::new(settings.output_dir.clone()));
        Self::with_sinks(store, settings, sinks)
    }

    /// Create an engine writing artifacts to `sinks`.
    ///
    /// Subscribes the change history to `store` and registers the built-in
    /// control programs, leaving the engine Configured.
    pub fn with_sinks(
        store: Arc<dyn GraphStore>,
        settings: EngineSettings,
        sinks: Arc<dyn SinkProvider>,
    ) -> Self {
        let changes = Arc::new(ChangeHistory::new());
        store.subscribe(Arc::clone(&changes) as Arc<dyn GraphListener>);

        let control = ControlResource::new(&settings.base_uri);
        let mut programs = ProgramRegistry::new();
        programs.register_update(
            ProgramKind::SingleUpdate,
            INIT_PROGRAM,
            control.init_program(settings.timeslot),
        );
        programs.register_update(
            ProgramKind::ContinuousUpdate,
            TICK_PROGRAM,
            control.tick_program(),
        );

        let mut core = EngineCore {
            state: SimulationState::Created,
            programs,
            datasets: Vec::new(),
            predicate: control.done_predicate(),
            dump_pattern: None,
            run: None,
            completed_runs: 0,
            last_run: None,
        };

        let (status, _) = watch::channel(EngineStatus {
            state: SimulationState::Created,
            completed_runs: 0,
        });
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        let publisher = Publisher {
            status,
            transitions,
        };
        if publisher
            .transition(&mut core, SimulationState::Configured)
            .is_ok()
        {
            info!(base_uri = %settings.base_uri, control = %control.iri(), "Simulation engine created");
        }

        Self {
            shared: Arc::new(Shared {
                store,
                settings,
                control,
                sinks,
                changes,
                interactions: Arc::new(InteractionHistory::new()),
                publisher,
                core: Mutex::new(core),
                requests: Arc::new(RwLock::new(())),
                driver: std::sync::Mutex::new(None),
            }),
        }
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    /// The live store.
    pub fn store(&self) -> Arc<dyn GraphStore> {
        Arc::clone(&self.shared.store)
    }

    /// Engine settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.shared.settings
    }

    /// The control resource.
    pub fn control(&self) -> &ControlResource {
        &self.shared.control
    }

    /// The change history (subscribed to the live store).
    pub fn change_history(&self) -> Arc<ChangeHistory> {
        Arc::clone(&self.shared.changes)
    }

    /// The interaction history. Subscribe it to the protocol handler's
    /// listener set.
    pub fn interaction_history(&self) -> Arc<InteractionHistory> {
        Arc::clone(&self.shared.interactions)
    }

    /// Current status, without locking.
    pub fn status(&self) -> EngineStatus {
        *self.shared.publisher.status.borrow()
    }

    /// Current state, without locking.
    pub fn state(&self) -> SimulationState {
        self.status().state
    }

    /// Watch status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<EngineStatus> {
        self.shared.publisher.status.subscribe()
    }

    /// Receive every transition realized from now on.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<Transition> {
        self.shared.publisher.transitions.subscribe()
    }

    /// Admit a protocol request into the current run.
    ///
    /// Waits while the run is being sealed, then re-checks the state. The
    /// permit is granted only while Running; otherwise the state found is
    /// returned.
    pub async fn admit_request(&self) -> Result<RequestPermit, SimulationState> {
        let gate = Arc::clone(&self.shared.requests).read_owned().await;
        match self.state() {
            SimulationState::Running => Ok(RequestPermit { _gate: gate }),
            other => Err(other),
        }
    }

    /// Summary of the most recent completed run.
    pub async fn last_run(&self) -> Option<RunSummary> {
        self.shared.core.lock().await.last_run.clone()
    }

    // -----------------------------------------------------------------
    // Registration (Configured only)
    // -----------------------------------------------------------------

    async fn configurable(&self) -> Result<MutexGuard<'_, EngineCore>, EngineError> {
        let core = self.shared.core.lock().await;
        if core.state == SimulationState::Configured {
            Ok(core)
        } else {
            Err(EngineError::RegistrationClosed { state: core.state })
        }
    }

    /// Register a dataset loaded at every initialization. A dataset with
    /// the same name is replaced in place.
    pub async fn register_dataset(&self, name: &str, quads: Vec<Quad>) -> Result<(), EngineError> {
        let mut core = self.configurable().await?;
        let size = quads.len();
        if let Some(existing) = core.datasets.iter_mut().find(|d| d.name == name) {
            existing.quads = quads;
        } else {
            core.datasets.push(Dataset {
                name: name.to_owned(),
                quads,
            });
        }
        info!(dataset = name, statements = size, "Dataset registered");
        Ok(())
    }

    /// Register a single update program.
    pub async fn register_single_update(
        &self,
        name: &str,
        program: Arc<dyn UpdateProgram>,
    ) -> Result<(), EngineError> {
        self.register_update(ProgramKind::SingleUpdate, name, program)
            .await
    }

    /// Register a continuous update program.
    pub async fn register_continuous_update(
        &self,
        name: &str,
        program: Arc<dyn UpdateProgram>,
    ) -> Result<(), EngineError> {
        self.register_update(ProgramKind::ContinuousUpdate, name, program)
            .await
    }

    async fn register_update(
        &self,
        kind: ProgramKind,
        name: &str,
        program: Arc<dyn UpdateProgram>,
    ) -> Result<(), EngineError> {
        let mut core = self.configurable().await?;
        let replaced = core.programs.register_update(kind, name, program);
        info!(program = name, kind = ?kind, replaced, "Update program registered");
        Ok(())
    }

    /// Register a query evaluated at every slot during replay.
    pub async fn register_query(
        &self,
        name: &str,
        program: Arc<dyn QueryProgram>,
    ) -> Result<(), EngineError> {
        let mut core = self.configurable().await?;
        let file = query_sink_path(Path::new(""), name);
        let taken = file == Path::new(INTERACTIONS_FILE)
            || core
                .programs
                .names(ProgramKind::Query)
                .into_iter()
                .any(|other| other != name && query_sink_path(Path::new(""), other) == file);
        if taken {
            let file = file.display().to_string();
            warn!(program = name, %file, "Query rejected, result file already taken");
            return Err(EngineError::ArtifactCollision {
                name: name.to_owned(),
                file,
            });
        }
        let replaced = core.programs.register_query(name, program);
        info!(program = name, replaced, "Query registered");
        Ok(())
    }

    /// Replace the termination predicate.
    pub async fn set_termination_predicate(
        &self,
        predicate: Arc<dyn AskProgram>,
    ) -> Result<(), EngineError> {
        let mut core = self.configurable().await?;
        core.predicate = predicate;
        info!("Termination predicate replaced");
        Ok(())
    }

    /// Set (or clear) the dump pattern. `%d` is replaced by the slot index.
    pub async fn set_dump_pattern(&self, pattern: Option<String>) -> Result<(), EngineError> {
        let mut core = self.configurable().await?;
        info!(pattern = ?pattern, "Dump pattern set");
        core.dump_pattern = pattern;
        Ok(())
    }

    /// Close registration. The engine then waits for the start signal.
    pub async fn registration_done(&self) -> Result<(), EngineError> {
        let mut core = self.shared.core.lock().await;
        self.shared
            .publisher
            .transition(&mut core, SimulationState::Initializing)?;
        info!(
            single_updates = ?core.programs.names(ProgramKind::SingleUpdate),
            continuous_updates = ?core.programs.names(ProgramKind::ContinuousUpdate),
            queries = ?core.programs.names(ProgramKind::Query),
            dump_pattern = ?core.dump_pattern,
            "Simulation engine configured, waiting for start signal"
        );
        Ok(())
    }

    // -----------------------------------------------------------------
    // Run lifecycle
    // -----------------------------------------------------------------

    /// Start a run locally. Closes registration if still open.
    pub async fn start(&self) -> Result<RunId, EngineError> {
        let mut core = self.shared.core.lock().await;
        match core.state {
            SimulationState::Configured => {
                self.shared
                    .publisher
                    .transition(&mut core, SimulationState::Initializing)?;
            }
            SimulationState::Initializing => {}
            state if state.run_in_progress() => {
                warn!(%state, "Start rejected, run in progress");
                return Err(EngineError::RunInProgress { state });
            }
            state => {
                error!(%state, "Start requested before configuration");
                return Err(EngineError::IllegalTransition {
                    from: state,
                    to: SimulationState::Initializing,
                });
            }
        }
        match self.begin_run(&mut core, || Ok::<(), std::convert::Infallible>(()))? {
            Ok((run_id, ())) => Ok(run_id),
            Err(never) => match never {},
        }
    }

    /// Atomically check that the engine awaits its start signal, perform
    /// `write` on the live store, and start the run.
    ///
    /// `write` runs after slot 0 opened, so its changes are recorded. If
    /// the engine is not awaiting a start signal, `write` is not called.
    pub async fn start_with_control_write<T, E, F>(
        &self,
        write: F,
    ) -> Result<ControlStart<T, E>, EngineError>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let mut core = self.shared.core.lock().await;
        if core.state != SimulationState::Initializing {
            return Ok(ControlStart::NotAwaiting(core.state));
        }
        Ok(match self.begin_run(&mut core, write)? {
            Ok((run_id, output)) => ControlStart::Started { run_id, output },
            Err(rejected) => ControlStart::Rejected(rejected),
        })
    }

    /// Initializing -> Ready -> Running, under the core lock.
    fn begin_run<T, E>(
        &self,
        core: &mut EngineCore,
        write: impl FnOnce() -> Result<T, E>,
    ) -> Result<Result<(RunId, T), E>, EngineError> {
        let shared = &self.shared;
        let baseline = shared.store.statements()?;
        shared.changes.open()?;
        if let Err(err) = shared.interactions.open() {
            shared.changes.clear();
            return Err(err.into());
        }

        let output = match write() {
            Ok(output) => output,
            Err(rejected) => {
                shared.changes.clear();
                shared.interactions.clear();
                return Ok(Err(rejected));
            }
        };

        info!("Initializing simulation run");
        if let Err(err) = self.initialize(core) {
            error!(error = %err, "Initialization failed, restoring baseline");
            self.reset(baseline);
            return Err(err);
        }

        let run = core.completed_runs.saturating_add(1);
        let run_id = RunId::new();
        core.run = Some(RunContext {
            run_id,
            run,
            started_at: Utc::now(),
            ticks: 0,
            baseline,
        });
        shared
            .publisher
            .transition(core, SimulationState::Ready)?;
        info!(
            %run_id,
            run,
            statements = shared.store.len()?,
            "Simulation ready"
        );

        shared
            .publisher
            .transition(core, SimulationState::Running)?;
        self.spawn_driver();
        info!(%run_id, period_ms = shared.settings.timeslot.as_millis(), "Simulation running");
        Ok(Ok((run_id, output)))
    }

    /// Load datasets and run single updates into slot 0.
    fn initialize(&self, core: &EngineCore) -> Result<(), EngineError> {
        let store = self.shared.store.as_ref();
        let started = Instant::now();
        for dataset in &core.datasets {
            let inserted = store.load(dataset.quads.clone())?;
            debug!(dataset = %dataset.name, inserted, "Dataset loaded");
        }
        for entry in core.programs.single_updates() {
            if let Err(err) = entry.program.execute(store) {
                error!(program = %entry.name, error = %err, "Single update failed");
            }
        }
        self.shared
            .interactions
            .record_update_duration(started.elapsed());
        Ok(())
    }

    /// Drop both histories and restore the live store to `baseline`.
    fn reset(&self, baseline: Vec<Quad>) {
        let shared = &self.shared;
        shared.changes.clear();
        shared.interactions.clear();
        let restored = shared
            .store
            .clear()
            .and_then(|()| shared.store.load(baseline));
        if let Err(err) = restored {
            error!(error = %err, "Could not restore the live store");
        }
    }

    fn spawn_driver(&self) {
        let ticker = self.clone();
        let scheduler = Scheduler::start(self.shared.settings.timeslot, move || {
            let engine = ticker.clone();
            async move { engine.tick().await }
        });
        let stop = scheduler.stop_signal();
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            let fired = scheduler.join().await;
            debug!(fired, "Scheduler finished");
            engine.conclude().await;
        });
        let mut driver = self
            .shared
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *driver = Some(RunDriver { stop, handle });
    }

    /// Running -> Replaying, sealing both histories once every admitted
    /// request has finished.
    async fn enter_replay(&self, core: &mut EngineCore) -> Result<(), EngineError> {
        let _drained = self.shared.requests.write().await;
        self.shared
            .publisher
            .transition(core, SimulationState::Replaying)?;
        self.shared.changes.seal();
        self.shared.interactions.seal();
        Ok(())
    }

    /// One scheduler tick.
    async fn tick(&self) -> TickOutcome {
        let shared = &self.shared;
        let mut core = shared.core.lock().await;
        if core.state != SimulationState::Running {
            return TickOutcome::Stop;
        }

        let terminate = match core.predicate.evaluate(shared.store.as_ref()) {
            Ok(done) => done,
            Err(err) => {
                error!(error = %err, "Termination predicate failed, ending run");
                true
            }
        };
        if terminate {
            let ticks = core.run.as_ref().map_or(0, |run| run.ticks);
            info!(ticks, "Termination predicate holds");
            if let Err(err) = self.enter_replay(&mut core).await {
                error!(error = %err, "Could not enter replay");
            }
            return TickOutcome::Stop;
        }

        let slot = match shared.changes.time_incremented() {
            Ok(slot) => slot,
            Err(err) => {
                error!(error = %err, "Could not advance the change history");
                if let Err(err) = self.enter_replay(&mut core).await {
                    error!(error = %err, "Could not enter replay");
                }
                return TickOutcome::Stop;
            }
        };
        if let Err(err) = shared.interactions.time_incremented() {
            error!(slot, error = %err, "Could not advance the interaction history");
        }
        if let Some(run) = core.run.as_mut() {
            run.ticks = run.ticks.saturating_add(1);
        }

        let started = Instant::now();
        for entry in core.programs.continuous_updates() {
            if let Err(err) = entry.program.execute(shared.store.as_ref()) {
                error!(slot, program = %entry.name, error = %err, "Continuous update failed");
            }
        }
        let elapsed = started.elapsed();
        shared.interactions.record_update_duration(elapsed);
        if elapsed > shared.settings.timeslot {
            warn!(
                slot,
                elapsed_ms = elapsed.as_millis(),
                period_ms = shared.settings.timeslot.as_millis(),
                "Updates took longer than the timeslot"
            );
        }
        debug!(slot, "Tick complete");
        TickOutcome::Continue
    }

    /// Replaying -> Cleaning -> Configured -> Initializing.
    async fn conclude(&self) {
        let shared = &self.shared;
        let mut core = shared.core.lock().await;
        if core.state == SimulationState::Running {
            info!("Run stopped by operator");
            if self.enter_replay(&mut core).await.is_err() {
                return;
            }
        }
        if core.state != SimulationState::Replaying {
            error!(state = %core.state, "Run concluded outside of Replaying");
            return;
        }
        let Some(run) = core.run.take() else {
            error!("Replaying without a run context");
            return;
        };

        let run_dir = PathBuf::from(format!("run-{}", run.run));
        let history = shared.changes.sequences();
        info!(run = run.run, slots = history.len(), "Simulation run done, replaying");
        let private = shared.store.detached();
        let plan = ReplayPlan {
            history: &history,
            queries: core.programs.queries(),
            dump_pattern: core.dump_pattern.as_deref(),
            run_dir: &run_dir,
        };
        let report = off_the_executor(|| {
            let mut report = replay(private.as_ref(), &plan, shared.sinks.as_ref());
            if !self.write_interactions(&run_dir) {
                report.failures = report.failures.saturating_add(1);
            }
            report
        });

        let summary = RunSummary {
            run_id: run.run_id,
            run: run.run,
            ticks: run.ticks,
            timeslots: history.len(),
            started_at: run.started_at,
            ended_at: Utc::now(),
            output_dir: run_dir,
            replay: report,
        };
        off_the_executor(|| self.write_manifest(&summary));

        if shared
            .publisher
            .transition(&mut core, SimulationState::Cleaning)
            .is_err()
        {
            return;
        }
        info!("Results written, cleaning resources");
        self.reset(run.baseline);
        core.completed_runs = core.completed_runs.saturating_add(1);
        core.last_run = Some(summary);

        if shared
            .publisher
            .transition(&mut core, SimulationState::Configured)
            .is_err()
        {
            return;
        }
        if shared
            .publisher
            .transition(&mut core, SimulationState::Initializing)
            .is_ok()
        {
            info!(
                completed_runs = core.completed_runs,
                "Simulation engine re-armed, waiting for start signal"
            );
        }
    }

    fn write_interactions(&self, run_dir: &Path) -> bool {
        let path = run_dir.join(INTERACTIONS_FILE);
        let written = self
            .shared
            .sinks
            .open(&path)
            .and_then(|mut sink| self.shared.interactions.write_tsv(&mut sink));
        match written {
            Ok(()) => true,
            Err(err) => {
                error!(path = %path.display(), error = %err, "Could not write interaction history");
                false
            }
        }
    }

    fn write_manifest(&self, summary: &RunSummary) {
        let path = summary.output_dir.join(MANIFEST_FILE);
        let written = self.shared.sinks.open(&path).and_then(|mut sink| {
            serde_json::to_writer_pretty(&mut sink, summary).map_err(std::io::Error::other)?;
            writeln!(sink)?;
            sink.flush()
        });
        if let Err(err) = written {
            error!(path = %path.display(), error = %err, "Could not write run manifest");
        }
    }

    /// Operator stop: end the current run at the next scheduling point and
    /// wait until replay and cleanup have completed. Returns the summary
    /// of the last completed run.
    pub async fn stop(&self) -> Option<RunSummary> {
        let driver = self
            .shared
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(driver) = driver {
            info!("Stop requested");
            driver.stop.stop();
            if let Err(err) = driver.handle.await {
                error!(error = %err, "Run driver failed");
            }
        }
        self.last_run().await
    }

    /// Wait for the current run, if any, to finish on its own. Returns the
    /// summary of the last completed run.
    pub async fn wait_for_run(&self) -> Option<RunSummary> {
        let driver = self
            .shared
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(driver) = driver
            && let Err(err) = driver.handle.await
        {
            error!(error = %err, "Run driver failed");
        }
        self.last_run().await
    }
}
