//! # PHOTON Game Loop
//!
//! Three subsystem threads share the live world, each at its own rate:
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │ logic   (logic_hz)   prepare queues → drain input → run scripts      │
//! │ physics (physics_hz) assign actors → integrate → answer raycasts     │
//! │ render  (render_hz)  refresh snapshots → extract frame → submit      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no global frame lock. Each tick opens the transactions it needs
//! and the lock manager serializes only the ticks that actually conflict.
//! Shutdown is one shared flag checked between ticks.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use photon_core::script::register_builtin_scripts;
use photon_core::{ComponentRegistry, EngineConfig, MergeStats, SceneManager, ScriptRunner};
use tracing::{debug, error, info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::events::InputBridge;
use crate::logic::LogicSystem;
use crate::physics::{KinematicPhysics, PhysicsBridge};
use crate::render::{RenderBackend, RenderSystem};

// ============================================================================
// SHUTDOWN
// ============================================================================

/// Shared stop flag.
#[derive(Clone, Debug, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    /// A flag that is not set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every subsystem to stop after its current tick.
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// True once [`Shutdown::request`] was called.
    #[inline]
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ============================================================================
// FRAME PACING
// ============================================================================

/// Sleeps a thread to a fixed rate and measures real intervals.
#[derive(Debug)]
pub struct FramePacer {
    period: Duration,
    max_interval: Duration,
    last: Instant,
    next: Instant,
}

impl FramePacer {
    /// A pacer ticking every `period`, reporting intervals of at most
    /// `max_interval`.
    #[must_use]
    pub fn new(period: Duration, max_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            period,
            max_interval,
            last: now,
            next: now,
        }
    }

    /// Target tick period.
    #[inline]
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Waits for the next tick.
    ///
    /// # Returns
    ///
    /// Time since the previous tick, clamped to the maximum interval so a
    /// stalled process does not produce one huge step.
    pub fn wait(&mut self) -> Duration {
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
        }

        let now = Instant::now();
        let interval = now.duration_since(self.last).min(self.max_interval);
        self.last = now;
        // Fell behind: restart the schedule instead of bursting.
        self.next = if self.next + self.period < now {
            now + self.period
        } else {
            self.next + self.period
        };
        interval
    }
}

// ============================================================================
// FRAME STATISTICS
// ============================================================================

/// Timing of one subsystem tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Tick number.
    pub frame: u64,
    /// Time spent in the tick, in microseconds.
    pub work_us: u64,
    /// Interval handed to the tick, in microseconds.
    pub interval_us: u64,
}

/// Accumulator for one subsystem's frame statistics.
#[derive(Clone, Debug)]
pub struct FrameStatsAccumulator {
    /// Tick budget.
    pub budget: Duration,
    /// Ticks recorded.
    pub frames_recorded: u64,
    /// Sum of work times.
    pub work_us_sum: u64,
    /// Shortest work time.
    pub min_work_us: u64,
    /// Longest work time.
    pub max_work_us: u64,
    /// Ticks whose work exceeded the budget.
    pub frames_over_budget: u64,
}

impl FrameStatsAccumulator {
    /// Creates an accumulator for ticks that should finish within `budget`.
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            frames_recorded: 0,
            work_us_sum: 0,
            min_work_us: u64::MAX,
            max_work_us: 0,
            frames_over_budget: 0,
        }
    }

    /// Records a tick.
    pub fn record(&mut self, stats: FrameStats) {
        self.frames_recorded += 1;
        self.work_us_sum += stats.work_us;
        self.min_work_us = self.min_work_us.min(stats.work_us);
        self.max_work_us = self.max_work_us.max(stats.work_us);
        if u128::from(stats.work_us) > self.budget.as_micros() {
            self.frames_over_budget += 1;
        }
    }

    /// Average work time in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_work_ms(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        (self.work_us_sum as f64 / self.frames_recorded as f64) / 1000.0
    }

    /// Fraction of ticks over budget.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn over_budget_ratio(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        self.frames_over_budget as f64 / self.frames_recorded as f64
    }
}

/// Per-subsystem statistics of a finished run.
#[derive(Clone, Debug)]
pub struct RunReport {
    /// Logic thread.
    pub logic: FrameStatsAccumulator,
    /// Physics thread.
    pub physics: FrameStatsAccumulator,
    /// Render thread.
    pub render: FrameStatsAccumulator,
}

// ============================================================================
// SUBSYSTEM THREADS
// ============================================================================

/// A running subsystem thread.
#[derive(Debug)]
pub struct SubsystemHandle {
    name: &'static str,
    thread: JoinHandle<RuntimeResult<FrameStatsAccumulator>>,
}

impl SubsystemHandle {
    /// Subsystem name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Waits for the thread to finish.
    ///
    /// # Errors
    ///
    /// The tick error that stopped the thread, or
    /// [`RuntimeError::ThreadPanicked`].
    pub fn join(self) -> RuntimeResult<FrameStatsAccumulator> {
        self.thread
            .join()
            .map_err(|_| RuntimeError::ThreadPanicked(self.name))?
    }
}

/// Runs `tick` on a named thread at `period` until `shutdown` is requested
/// or `frames` ticks have run.
///
/// A tick error requests shutdown for every subsystem and ends the thread.
///
/// # Errors
///
/// [`RuntimeError::Spawn`] if the OS refuses the thread.
pub fn spawn_subsystem<F>(
    name: &'static str,
    period: Duration,
    max_interval: Duration,
    frames: Option<u64>,
    shutdown: Shutdown,
    mut tick: F,
) -> RuntimeResult<SubsystemHandle>
where
    F: FnMut(Duration) -> RuntimeResult<()> + Send + 'static,
{
    let thread = thread::Builder::new()
        .name(format!("photon-{name}"))
        .spawn(move || {
            let mut pacer = FramePacer::new(period, max_interval);
            let mut stats = FrameStatsAccumulator::new(period);
            let mut frame = 0;
            info!(target: "photon::runtime", subsystem = name, ?period, "subsystem started");

            while !shutdown.is_requested() && frames.map_or(true, |limit| frame < limit) {
                let interval = pacer.wait();
                let start = Instant::now();
                if let Err(err) = tick(interval) {
                    error!(target: "photon::runtime", subsystem = name, error = %err, "subsystem failed");
                    shutdown.request();
                    return Err(err);
                }
                let work = start.elapsed();
                if work > period {
                    debug!(target: "photon::runtime", subsystem = name, frame, ?work, "tick over budget");
                }
                stats.record(FrameStats {
                    frame,
                    work_us: u64::try_from(work.as_micros()).unwrap_or(u64::MAX),
                    interval_us: u64::try_from(interval.as_micros()).unwrap_or(u64::MAX),
                });
                frame += 1;
            }

            info!(
                target: "photon::runtime",
                subsystem = name,
                frames = stats.frames_recorded,
                avg_ms = stats.avg_work_ms(),
                "subsystem stopped"
            );
            Ok(stats)
        })
        .map_err(|source| RuntimeError::Spawn { name, source })?;

    Ok(SubsystemHandle { name, thread })
}

// ============================================================================
// ENGINE
// ============================================================================

/// Owns the worlds, the input bridge and the shutdown flag.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    scenes: Arc<SceneManager>,
    input: Arc<InputBridge>,
    shutdown: Shutdown,
}

impl Engine {
    /// Builds the registry and worlds and registers the built-in scripts.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        register_builtin_scripts();
        let registry = ComponentRegistry::builder().with_engine_components().build();
        let input = Arc::new(InputBridge::new(config.input_queue_capacity));

        Self {
            config,
            scenes: Arc::new(SceneManager::new(registry)),
            input,
            shutdown: Shutdown::new(),
        }
    }

    /// Runtime settings.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Staging and live worlds.
    #[inline]
    #[must_use]
    pub fn scenes(&self) -> &Arc<SceneManager> {
        &self.scenes
    }

    /// Bridge for input threads.
    #[inline]
    #[must_use]
    pub fn input(&self) -> &Arc<InputBridge> {
        &self.input
    }

    /// The stop flag shared with every subsystem.
    #[inline]
    #[must_use]
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Loads a scene file, named after its file stem, into live.
    ///
    /// The file is read and parsed before any transaction opens.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Io`], [`RuntimeError::SceneParse`], or the load error.
    pub fn load_scene_file(&self, path: impl AsRef<Path>) -> RuntimeResult<MergeStats> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RuntimeError::Io {
            path: path.to_owned(),
            source,
        })?;
        let document: serde_json::Value =
            serde_json::from_str(&text).map_err(|source| RuntimeError::SceneParse {
                path: path.to_owned(),
                source,
            })?;
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("scene");

        let stats = self.scenes.load_scene_json(name, &document)?;
        info!(
            target: "photon::runtime",
            scene = name,
            path = %path.display(),
            entities = stats.created + stats.updated,
            "scene file loaded"
        );
        Ok(stats)
    }

    /// Runs logic, physics and render threads against the live world.
    ///
    /// Returns when shutdown is requested, when every thread has run
    /// `frames` ticks, or when a thread fails.
    ///
    /// # Errors
    ///
    /// The first subsystem failure.
    pub fn run<B>(&self, backend: B, frames: Option<u64>) -> RuntimeResult<RunReport>
    where
        B: RenderBackend + 'static,
    {
        let physics: Box<dyn PhysicsBridge> = Box::new(KinematicPhysics::new(self.config.gravity));
        self.run_with(backend, physics, frames)
    }

    /// [`Engine::run`] with a custom physics bridge.
    ///
    /// # Errors
    ///
    /// The first subsystem failure.
    pub fn run_with<B>(
        &self,
        backend: B,
        mut physics: Box<dyn PhysicsBridge>,
        frames: Option<u64>,
    ) -> RuntimeResult<RunReport>
    where
        B: RenderBackend + 'static,
    {
        let max_interval = self.config.max_interval();
        info!(
            target: "photon::runtime",
            backend = backend.name(),
            logic_hz = self.config.logic_hz,
            physics_hz = self.config.physics_hz,
            render_hz = self.config.render_hz,
            "engine starting"
        );

        let logic = {
            let scenes = Arc::clone(&self.scenes);
            let system = LogicSystem::new(
                ScriptRunner::new(self.config.event_queue_capacity),
                Arc::clone(&self.input),
            );
            spawn_subsystem(
                "logic",
                self.config.logic_interval(),
                max_interval,
                frames,
                self.shutdown.clone(),
                move |interval| {
                    system.tick(scenes.live(), interval);
                    Ok(())
                },
            )?
        };

        let physics = {
            let scenes = Arc::clone(&self.scenes);
            spawn_subsystem(
                "physics",
                self.config.physics_interval(),
                max_interval,
                frames,
                self.shutdown.clone(),
                move |interval| {
                    physics.step(scenes.live(), interval);
                    Ok(())
                },
            )
        };
        let physics = match physics {
            Ok(handle) => handle,
            Err(err) => {
                self.shutdown.request();
                let _ = logic.join();
                return Err(err);
            }
        };

        let render = {
            let scenes = Arc::clone(&self.scenes);
            let mut system = RenderSystem::new(backend);
            spawn_subsystem(
                "render",
                self.config.render_interval(),
                max_interval,
                frames,
                self.shutdown.clone(),
                move |_| system.tick(scenes.live()).map(|_| ()),
            )
        };
        let render = match render {
            Ok(handle) => handle,
            Err(err) => {
                self.shutdown.request();
                let _ = logic.join();
                let _ = physics.join();
                return Err(err);
            }
        };

        let logic = logic.join();
        let physics = physics.join();
        let render = render.join();
        if frames.is_none() && !self.shutdown.is_requested() {
            warn!(target: "photon::runtime", "subsystems stopped without a shutdown request");
        }
        info!(target: "photon::runtime", "engine stopped");

        Ok(RunReport {
            logic: logic?,
            physics: physics?,
            render: render?,
        })
    }
}
