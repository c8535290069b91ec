//! Bruteguard - Brute-Force Throttling Engine
//!
//! This crate counts, per client identity and protected operation, how often
//! an operation was attempted within a sliding window and turns attempts
//! beyond a green threshold into an escalating delay. Counters live either in
//! a process-local store or in a shared cache so several instances can
//! throttle together.

pub mod config;
pub mod error;
pub mod guard;
pub mod throttle;

pub use config::GuardConfig;
pub use error::{BruteGuardError, Result};
pub use guard::{OverLimitAction, RequestGuard, Verdict};
pub use throttle::{ClientRequest, Decision, Throttle};
