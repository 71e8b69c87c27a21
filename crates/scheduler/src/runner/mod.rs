//! Detection scheduler -- fixed-delay streams over a shared worker pool.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructor, start/stop and accessors
//! - `execution`: one detection run (job + tasks) and per-task evaluation
//! - `scheduling`: fixed-delay trigger loops for functions and the monitor
//! - `backfill`: ad hoc evaluation of consecutive windows over a range

mod backfill;
mod core;
mod execution;
mod scheduling;

pub use self::core::Scheduler;
