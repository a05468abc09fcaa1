use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

pub trait Clock {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Shared flag asking a run to stop at its next safe point.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitResult {
    Elapsed,
    Cancelled { waited: Duration },
}

/// Sleep for `total` in slices of at most `slice`.
///
/// `on_slice(waited, total)` runs after every slice and the token is checked
/// before each one, so a long wait stays observable and can be abandoned.
pub fn sliced_wait<C>(
    clock: &C,
    total: Duration,
    slice: Duration,
    cancel: &CancelToken,
    mut on_slice: impl FnMut(Duration, Duration),
) -> WaitResult
where
    C: Clock + ?Sized,
{
    let slice = if slice.is_zero() { total } else { slice };
    let mut waited = Duration::ZERO;

    while waited < total {
        if cancel.is_cancelled() {
            return WaitResult::Cancelled { waited };
        }

        let step = slice.min(total - waited);
        clock.sleep(step);
        waited += step;
        on_slice(waited, total);
    }

    WaitResult::Elapsed
}
