use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crossbeam::channel::{bounded, Receiver, Sender};

/// Allows cancelling active tasks
#[derive(Clone)]
pub struct TaskCanceller {
    cancel: Arc<AtomicBool>,
}

impl TaskCanceller {
    pub fn new() -> (Self, TaskCancelCheck) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancel = Arc::clone(&cancelled);
        (Self { cancel }, TaskCancelCheck { cancelled })
    }

    /// Cancel the task. This can be invoked more than once, but only the first
    /// invocation matters.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

#[derive(Clone)]
pub struct TaskCancelCheck {
    cancelled: Arc<AtomicBool>,
}

impl TaskCancelCheck {
    /// A check that is never cancelled
    pub fn never() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check to see if the task has been cancelled
    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// [was_cancelled] as an error, for use with `?` between steps
    pub fn check(&self) -> crate::Result<()> {
        if self.was_cancelled() {
            Err(crate::Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub trait EventMonitor<T>: Send + Sync {
    fn on_event(&self, evt: T);
}

impl<T, U> EventMonitor<U> for Box<T>
where
    T: EventMonitor<U> + ?Sized,
{
    fn on_event(&self, evt: U) {
        self.as_ref().on_event(evt)
    }
}

/// An [EventMonitor] that is just a noop
pub struct NoopMonitor;

impl<T> EventMonitor<T> for NoopMonitor {
    fn on_event(&self, _evt: T) {
        // noop
    }
}

/// An [EventMonitor] that just dumps the events onto a channel.
pub struct ChannelEventMonitor<T>
where
    T: Sync + Send,
{
    chan: Sender<T>,
}

impl<T> ChannelEventMonitor<T>
where
    T: Sync + Send,
{
    pub fn create() -> (Self, Receiver<T>) {
        Self::create_with_bound(16)
    }

    pub fn create_with_bound(bound: usize) -> (Self, Receiver<T>) {
        let (tx, rx) = bounded(bound);
        (Self::new(tx), rx)
    }

    pub fn new(chan: Sender<T>) -> Self {
        Self { chan }
    }
}

impl<T> EventMonitor<T> for ChannelEventMonitor<T>
where
    T: Sync + Send,
{
    fn on_event(&self, evt: T) {
        let _ = self.chan.send(evt);
    }
}
