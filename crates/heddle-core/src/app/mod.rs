//! App - long-running loops built on top of the scheduler.
//!
//! Worker processes and their supervision live in `worker` and `spawner`.

pub mod reaper_loop;

pub use self::reaper_loop::ReaperLoop;
