//! Cooperative progress reporting and cancellation for long-running loops

use crate::error::CalcError;
use std::ops::ControlFlow;

/// Long loops check in with their [`Progress`] every this many iterations
pub const YIELD_BATCH: usize = 50;

/// Receives progress at fixed batch boundaries.
///
/// Returning `ControlFlow::Break(())` cancels the operation, which then
/// surfaces as [`CalcError::Cancelled`].
pub trait Progress {
    fn report(&mut self, completed: usize, total: usize) -> ControlFlow<()>;
}

/// Progress sink that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Progress for Silent {
    fn report(&mut self, _completed: usize, _total: usize) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

impl<F> Progress for F
where
    F: FnMut(usize, usize) -> ControlFlow<()>,
{
    fn report(&mut self, completed: usize, total: usize) -> ControlFlow<()> {
        self(completed, total)
    }
}

/// Call at the top of each iteration; reports on batch boundaries only
#[inline]
pub(crate) fn checkpoint(progress: &mut dyn Progress, completed: usize, total: usize) -> Result<(), CalcError> {
    if completed > 0 && completed % YIELD_BATCH == 0 {
        if let ControlFlow::Break(()) = progress.report(completed, total) {
            tracing::debug!(completed, total, "operation cancelled by progress hook");
            return Err(CalcError::Cancelled { completed, total });
        }
    }
    Ok(())
}

/// Final report once a loop has run to completion
pub(crate) fn finish(progress: &mut dyn Progress, total: usize) {
    // completion cannot be cancelled; the work is already done
    let _ = progress.report(total, total);
}
