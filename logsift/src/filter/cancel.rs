use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// Cooperative cancellation shared by readers, workers and the engine.
///
/// Clones observe the same state. [`Cancellation::signal`] returns a channel
/// that never carries a message but disconnects once `cancel` is called, so
/// it can sit in a `select!` next to a data channel.
#[derive(Debug, Clone)]
pub struct Cancellation {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
    cancelled: AtomicBool,
}

impl Cancellation {
    pub fn new() -> Self {
        let (trigger, signal) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                trigger: Mutex::new(Some(trigger)),
                signal,
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    /// Stops everything holding a clone of this token; idempotent
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let mut trigger = match self.inner.trigger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        trigger.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Returns a token that is cancelled along with this one but can also be
    /// cancelled on its own without touching the parent.
    ///
    /// A watcher thread forwards the parent's cancellation; it exits as soon
    /// as either token is cancelled, so callers should cancel the child once
    /// they are done with it.
    pub fn child(&self) -> Cancellation {
        let child = Cancellation::new();
        if self.is_cancelled() {
            child.cancel();
            return child;
        }

        let parent = self.clone();
        let watched = child.clone();
        thread::spawn(move || {
            select! {
                recv(parent.signal()) -> _ => watched.cancel(),
                recv(watched.signal()) -> _ => {}
            }
        });
        child
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::RecvTimeoutError;
    use std::time::Duration;

    #[test]
    fn test_signal_blocks_until_cancelled() {
        let cancel = Cancellation::new();
        assert!(!cancel.is_cancelled());
        assert_eq!(
            cancel.signal().recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Timeout)
        );

        cancel.cancel();
        assert!(cancel.is_cancelled());
        assert_eq!(
            cancel.signal().recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Disconnected)
        );

        // Second call is a no-op
        cancel.cancel();
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_clones_share_state_across_threads() {
        let cancel = Cancellation::new();
        let watcher = cancel.clone();

        let handle = thread::spawn(move || {
            select! {
                recv(watcher.signal()) -> _ => watcher.is_cancelled(),
                default(Duration::from_secs(5)) => false,
            }
        });

        thread::sleep(Duration::from_millis(20));
        cancel.cancel();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_child_follows_parent() {
        let parent = Cancellation::new();
        let child = parent.child();
        assert!(!child.is_cancelled());

        parent.cancel();
        assert_eq!(
            child.signal().recv_timeout(Duration::from_secs(5)),
            Err(RecvTimeoutError::Disconnected)
        );
        assert!(child.is_cancelled());

        let late = parent.child();
        assert!(late.is_cancelled());
    }

    #[test]
    fn test_child_cancel_leaves_parent_running() {
        let parent = Cancellation::new();
        let child = parent.child();
        child.cancel();

        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
        assert_eq!(
            parent.signal().recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Timeout)
        );
    }
}
