//! # PHOTON
//!
//! Runtime threads on top of `photon_core`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            PHOTON RUNTIME                            │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐              │
//! │  │  Input       │──>│  Logic       │   │  Physics     │              │
//! │  │  (any thd)   │   │  scripts     │   │  bridge      │              │
//! │  └──────────────┘   └──────┬───────┘   └──────┬───────┘              │
//! │                            │                  │                      │
//! │                            v                  v                      │
//! │                    ┌────────────────────────────────┐                │
//! │                    │  Live world (photon_core)      │                │
//! │                    │  per-component transactions    │                │
//! │                    └───────────────┬────────────────┘                │
//! │                                    v                                 │
//! │                            ┌──────────────┐                          │
//! │                            │  Render      │──> backend               │
//! │                            └──────────────┘                          │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `events`: Input bridge from device threads into `EventInput`
//! - `game_loop`: Engine, subsystem threads and frame pacing
//! - `logic`: Script tick with input delivery
//! - `physics`: Physics bridge trait and the kinematic simulation
//! - `render`: Frame extraction and render backends

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod events;
pub mod game_loop;
pub mod logic;
pub mod physics;
pub mod render;

pub use photon_core as core;

pub use error::{RuntimeError, RuntimeResult};
pub use events::{DrainStats, InputBridge, InputEvent, InputSender};
pub use game_loop::{Engine, FramePacer, FrameStats, FrameStatsAccumulator, RunReport, Shutdown};
pub use logic::{LogicStats, LogicSystem};
pub use physics::{KinematicPhysics, PhysicsBridge, PhysicsStats};
pub use render::{HeadlessBackend, RenderBackend, RenderFrame, RenderStats, RenderSystem};
