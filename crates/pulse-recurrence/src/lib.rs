//! Recurrence engine for the Pulse distribution scheduler.
//!
//! Computes the next due instant for a recurrence rule. Pure functions
//! only: no I/O, no state, so every edge case is independently testable.

mod engine;

pub use engine::compute_next_run;
