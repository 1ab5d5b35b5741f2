//! Per-user mutual exclusion for pipeline runs.

mod gate;

pub use gate::{SessionGate, SessionGuard};
