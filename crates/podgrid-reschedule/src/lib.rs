//! podgrid-reschedule — placement reuse under fault-driven rescheduling.
//!
//! When a job loses tasks to hardware faults, its next placement
//! attempt should disturb as little as possible: intact groups are kept
//! verbatim, repairable groups are patched within their super-pod, and
//! only what remains goes back through the selector.

pub mod resolver;

pub use resolver::{RELEASE_WAIT_WINDOW, ResolveOutcome, resolve};
