//! # procflow runner
//!
//! Drives one run from a signed manifest to a terminal status:
//! 1. Verify the manifest against the shared secret
//! 2. Parse the pinned program text
//! 3. Build the event buffer for the run
//! 4. Interpret the program with the chosen session adapter
//! 5. Report succeeded / failed / canceled with the top-level message
//!
//! Nothing before step 4 creates a session, and the event buffer is
//! always flushed before the report is returned.

mod runner;

pub use runner::{LogSink, RunReport, RunStatus, Runner, RunnerConfig};
