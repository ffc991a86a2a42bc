//! Message Guards
//!
//! State that keeps the bridge from acting twice on the same input:
//! - [`DedupGuard`] drops identical broker messages redelivered within a short window
//! - [`LoopGuard`] drops resets the bridge published itself when the broker echoes them
//!
//! Both guards take the current time as an argument so callers control the clock.
//! Neither is synchronized; the bridge keeps them behind a single lock.

mod dedup;
mod loop_guard;


pub use dedup::DedupGuard;
pub use loop_guard::LoopGuard;
