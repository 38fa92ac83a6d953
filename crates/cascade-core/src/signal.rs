//! Coalescing cross-thread render request.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Waker = Box<dyn Fn() + Send + Sync>;

/// A thread-safe, coalescing "work pending" flag.
///
/// Producers raise it from their own threads whenever a new frame is ready;
/// the render thread consumes it with [`take`](RenderSignal::take) before
/// running a pass. Any number of raises between two passes collapse into one
/// pending render; this is deliberately a flag, not a queue.
#[derive(Clone, Default)]
pub struct RenderSignal {
    inner: Arc<SignalInner>,
}

#[derive(Default)]
struct SignalInner {
    pending: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl RenderSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a render pass as pending and wake the host loop, if a waker is
    /// installed. Safe to call from any thread.
    pub fn raise(&self) {
        self.inner.pending.store(true, Ordering::SeqCst);
        if let Some(waker) = self.inner.waker.lock().unwrap().as_ref() {
            waker();
        }
    }

    /// Consume the pending flag. Returns whether a render was requested since
    /// the last `take`.
    pub fn take(&self) -> bool {
        self.inner.pending.swap(false, Ordering::SeqCst)
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Install a callback invoked on every raise (typically an event-loop
    /// wake-up). The callback runs on the raising thread.
    pub fn set_waker<F: Fn() + Send + Sync + 'static>(&self, waker: F) {
        *self.inner.waker.lock().unwrap() = Some(Box::new(waker));
    }
}

impl fmt::Debug for RenderSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderSignal")
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn raises_coalesce_into_one_take() {
        let signal = RenderSignal::new();
        signal.raise();
        signal.raise();
        signal.raise();

        assert!(signal.take());
        assert!(!signal.take());
    }

    #[test]
    fn waker_runs_on_every_raise() {
        let signal = RenderSignal::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        signal.set_waker(move || {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        signal.raise();
        signal.raise();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn raise_from_other_thread_is_visible() {
        let signal = RenderSignal::new();
        let remote = signal.clone();
        std::thread::spawn(move || remote.raise())
            .join()
            .expect("raiser thread");

        assert!(signal.take());
    }
}
