use std::cell::RefCell;
use std::sync::{Arc, Mutex};

use crate::fast_logger::MessageSlot;
use crate::ring_buffer::RingBuffer;

/// The SPSC message queue behind one producer thread.
pub type MessageQueue = RingBuffer<MessageSlot>;

/// One producer thread's queue. Created lazily on the thread's first
/// logging call against a given logger, registered with that logger's
/// registry, and retired when the thread exits.
pub struct ThreadQueue {
    queue: MessageQueue,
}

impl ThreadQueue {
    fn new() -> Self {
        Self {
            queue: MessageQueue::new(),
        }
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }
}

/// The set of live per-thread queues belonging to one logger.
///
/// The mutex guards only the set itself; the drainer takes a snapshot and
/// consumes queues with the lock released. A queue whose producer thread has
/// exited moves to the retired list, handing any residual messages to the
/// drainer: the next drain pass empties it and then drops it. This replaces
/// the unregister-and-hope-the-sleep-was-long-enough behavior with a
/// handoff that cannot lose messages while a drain pass still runs.
pub struct QueueRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    active: Vec<Arc<ThreadQueue>>,
    retired: Vec<Arc<ThreadQueue>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    pub fn register(&self, queue: Arc<ThreadQueue>) {
        self.inner.lock().unwrap().active.push(queue);
    }

    /// Removes `queue` from the active set. A queue still holding messages
    /// is retired rather than dropped, so the drainer can finish it.
    pub fn unregister(&self, queue: &Arc<ThreadQueue>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(index) = inner.active.iter().position(|q| Arc::ptr_eq(q, queue)) {
            let queue = inner.active.swap_remove(index);
            if !queue.queue().is_empty() {
                inner.retired.push(queue);
            }
        }
    }

    /// Copies out the active queues and takes ownership of the retired
    /// ones. Retired queues are gone from the registry after this call;
    /// the caller must drain them before letting them drop.
    pub fn snapshot(&self) -> (Vec<Arc<ThreadQueue>>, Vec<Arc<ThreadQueue>>) {
        let mut inner = self.inner.lock().unwrap();
        (inner.active.clone(), std::mem::take(&mut inner.retired))
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().unwrap().active.len()
    }

    pub fn retired_count(&self) -> usize {
        self.inner.lock().unwrap().retired.len()
    }
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Binding between one registry and this thread's queue in it. Dropped with
/// the thread's local storage, which unregisters the queue.
struct BoundQueue {
    registry: Arc<QueueRegistry>,
    queue: Arc<ThreadQueue>,
}

impl Drop for BoundQueue {
    fn drop(&mut self) {
        self.registry.unregister(&self.queue);
    }
}

thread_local! {
    static THREAD_QUEUES: RefCell<Vec<BoundQueue>> = RefCell::new(Vec::new());
}

/// Runs `f` with this thread's queue in `registry`, creating and
/// registering the queue on the thread's first call. A thread logging to
/// several loggers holds one queue per registry.
pub(crate) fn with_thread_queue<R>(
    registry: &Arc<QueueRegistry>,
    f: impl FnOnce(&ThreadQueue) -> R,
) -> R {
    THREAD_QUEUES.with(|bindings| {
        let mut bindings = bindings.borrow_mut();
        let existing = bindings.iter().position(|b| Arc::ptr_eq(&b.registry, registry));
        let index = match existing {
            Some(index) => index,
            None => {
                let queue = Arc::new(ThreadQueue::new());
                registry.register(Arc::clone(&queue));
                bindings.push(BoundQueue {
                    registry: Arc::clone(registry),
                    queue,
                });
                bindings.len() - 1
            }
        };
        f(&bindings[index].queue)
    })
}
