// src/engine/mod.rs

//! Scheduling engine.
//!
//! The pure cycle logic lives in [`core`]; the async shell that talks to the
//! launcher, writes logs and sends notifications is implemented in
//! [`runtime`]. [`finalize`] writes the final artifacts of a thread and
//! [`report`] formats progress lines.

pub mod core;
pub mod finalize;
pub mod report;
pub mod runtime;

pub use core::{CycleStep, QueuedJob, SchedulerCore};
pub use finalize::{Assembler, AssembledTree, FinalArtifacts, FinalPaths, Finalizer, LatestTreeAssembler};
pub use runtime::{COMMAND_LOG, RunSummary, Scheduler, SchedulerOptions};
