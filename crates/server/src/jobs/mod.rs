// crates/server/src/jobs/mod.rs
//! Upload-to-conversion job lifecycle.
//!
//! Provides:
//! - `JobRunner` - creates jobs, persists archives, runs one background
//!   conversion per job and records its outcome
//! - `StatusChange` - broadcast after each terminal status write

pub mod runner;
pub mod types;

pub use runner::JobRunner;
pub use types::StatusChange;
