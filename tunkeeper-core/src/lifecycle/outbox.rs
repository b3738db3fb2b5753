//! Ordered, lock-free-for-callers delivery of status events
//!
//! Events are queued while the manager lock is held, so their order matches
//! the order of the slot transitions. Delivery happens after the lock is
//! released, by whichever caller finds nobody else delivering. A sink that
//! calls back into the manager only queues more events; the loop already
//! running picks them up, so there is no recursion and no deadlock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::status::{StatusSink, StatusUpdate};

pub(crate) enum Notice {
    Status(StatusUpdate),
    Release,
}

#[derive(Default)]
struct Queue {
    notices: VecDeque<Notice>,
    delivering: bool,
}

pub(crate) struct Outbox {
    queue: Mutex<Queue>,
    sink: Arc<dyn StatusSink>,
}

impl Outbox {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            sink,
        }
    }

    pub fn push(&self, notice: Notice) {
        self.lock().notices.push_back(notice);
    }

    pub fn status(&self, update: StatusUpdate) {
        self.push(Notice::Status(update));
    }

    /// Deliver everything queued, unless another caller is already doing so.
    pub fn flush(&self) {
        {
            let mut queue = self.lock();
            if queue.delivering {
                return;
            }
            queue.delivering = true;
        }
        let _guard = DeliveryGuard(self);

        loop {
            let next = {
                let mut queue = self.lock();
                match queue.notices.pop_front() {
                    Some(notice) => notice,
                    None => {
                        queue.delivering = false;
                        return;
                    }
                }
            };

            match next {
                Notice::Status(update) => self.sink.on_status(&update),
                Notice::Release => self.sink.release(),
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hands delivery back if a sink panics mid-flush
struct DeliveryGuard<'a>(&'a Outbox);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock().delivering = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{LifecycleStatus, RecordingSink};
    use std::sync::OnceLock;

    #[test]
    fn flush_delivers_in_queue_order() {
        let sink = Arc::new(RecordingSink::new());
        let outbox = Outbox::new(sink.clone());

        outbox.status(StatusUpdate::new(LifecycleStatus::Connecting, Some(1)));
        outbox.status(StatusUpdate::new(LifecycleStatus::Connected, Some(1)));
        outbox.push(Notice::Release);
        outbox.flush();

        assert_eq!(
            sink.statuses(),
            vec![LifecycleStatus::Connecting, LifecycleStatus::Connected]
        );
        assert_eq!(sink.release_count(), 1);
    }

    /// Sink that queues one more event from inside its callback
    struct ReentrantSink {
        outbox: OnceLock<Arc<Outbox>>,
        inner: RecordingSink,
    }

    impl StatusSink for ReentrantSink {
        fn on_status(&self, update: &StatusUpdate) {
            self.inner.on_status(update);
            if update.status == LifecycleStatus::Disconnected
                && let Some(outbox) = self.outbox.get()
            {
                outbox.status(StatusUpdate::new(LifecycleStatus::Connecting, Some(2)));
                outbox.flush();
            }
        }
    }

    #[test]
    fn reentrant_flush_does_not_recurse() {
        let sink = Arc::new(ReentrantSink {
            outbox: OnceLock::new(),
            inner: RecordingSink::new(),
        });
        let outbox = Arc::new(Outbox::new(sink.clone()));
        let _ = sink.outbox.set(outbox.clone());

        outbox.status(StatusUpdate::new(LifecycleStatus::Disconnected, Some(1)));
        outbox.status(StatusUpdate::new(LifecycleStatus::Connected, Some(1)));
        outbox.flush();

        // The nested event lands after everything already queued
        assert_eq!(
            sink.inner.statuses(),
            vec![
                LifecycleStatus::Disconnected,
                LifecycleStatus::Connected,
                LifecycleStatus::Connecting,
            ]
        );
    }
}
