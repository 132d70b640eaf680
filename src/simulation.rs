//! Shared simulation machinery: RNG seeding, per-strategy panic isolation
//! and the rayon worker pool the parallel runners fan out over.

use crate::error::CalcError;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// A strategy whose simulation panicked; the others still report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyFailure {
    pub strategy: String,
    pub reason: String,
}

impl From<StrategyFailure> for CalcError {
    fn from(f: StrategyFailure) -> Self {
        CalcError::StrategyFailed { strategy: f.strategy, reason: f.reason }
    }
}

/// Seeded RNG for reproducible runs, entropy otherwise
pub fn make_rng(seed: Option<u64>) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    }
}

/// Independent seed for worker `stream`, so parallel runs stay reproducible
pub fn stream_seed(seed: Option<u64>, stream: u64) -> Option<u64> {
    seed.map(|s| s ^ stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one strategy's simulation, turning a panic into
/// [`CalcError::StrategyFailed`]. Errors returned by `f` pass through.
pub fn run_guarded<T, F>(strategy: &str, f: F) -> Result<T, CalcError>
where
    F: FnOnce() -> Result<T, CalcError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            tracing::error!(strategy, %reason, "strategy simulation panicked");
            Err(CalcError::StrategyFailed { strategy: strategy.to_string(), reason })
        }
    }
}

/// Split per-strategy results into successes and recorded failures.
/// Anything other than a strategy failure (cancellation) aborts the whole run.
pub fn partition_outcomes<R>(results: Vec<Result<R, CalcError>>) -> Result<(Vec<R>, Vec<StrategyFailure>), CalcError> {
    let mut ok = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(r) => ok.push(r),
            Err(CalcError::StrategyFailed { strategy, reason }) => failures.push(StrategyFailure { strategy, reason }),
            Err(e) => return Err(e),
        }
    }
    Ok((ok, failures))
}

/// Worker threads used by the parallel runners.
/// ~55% of cores, leaving room for the caller's own threads.
pub fn thread_count() -> usize {
    (num_cpus::get() * 55 / 100).max(1)
}

pub fn available_cores() -> usize {
    num_cpus::get()
}

/// Map `f` over `items` on a dedicated pool; results keep item order
pub fn fan_out<T, R, F>(items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> R + Sync + Send,
{
    let run = || items.par_iter().enumerate().map(|(i, item)| f(i, item)).collect();
    match ThreadPoolBuilder::new().num_threads(thread_count()).build() {
        Ok(pool) => pool.install(run),
        Err(e) => {
            tracing::warn!(error = %e, "falling back to the global rayon pool");
            run()
        }
    }
}
