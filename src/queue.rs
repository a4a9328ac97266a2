//! Bounded report ring with a single drain task.
//!
//! A [`ReportQueue`] decouples whoever produces reports (the transport callback, a
//! caller issuing a command) from the side effect that consumes them (a handler
//! dispatch, a transport write). The ring holds `capacity` slots and at most
//! `capacity - 1` live reports; excess reports are logged and dropped.
//!
//! Exactly one drain task is pending or running per queue. It is handed to the
//! [`Spawn`] executor only when a push finds no drain pending; the drain clears the
//! flag under the lock once it observes the ring empty. The lock covers ring
//! metadata and the copy in/out of a slot, never the sink call.

use crate::executor::Spawn;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::TryReserveError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use tracing::{error, trace, warn};

/// Consumer side effect run by the drain task, once per report, in push order.
pub trait ReportSink: Send + Sync + 'static {
    fn consume(&self, report: &[u8]);
}

impl<F> ReportSink for F
where
    F: Fn(&[u8]) + Send + Sync + 'static,
{
    fn consume(&self, report: &[u8]) {
        self(report)
    }
}

struct Ring {
    slots: Vec<Vec<u8>>,
    head: usize,
    tail: usize,
    drain_pending: bool,
    draining_on: Option<ThreadId>,
    closed: bool,
}

impl Ring {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn advance(&self, index: usize) -> usize {
        (index + 1) % self.capacity()
    }

    fn len(&self) -> usize {
        (self.head + self.capacity() - self.tail) % self.capacity()
    }
}

struct Shared {
    name: String,
    max_report_len: usize,
    ring: Mutex<Ring>,
    idle: Condvar,
    dropped: AtomicU64,
    sink: Box<dyn ReportSink>,
    spawner: Arc<dyn Spawn>,
}

/// Cloneable handle to one ring.
#[derive(Clone)]
pub struct ReportQueue {
    shared: Arc<Shared>,
}

impl ReportQueue {
    /// Allocates `capacity` slots of `max_report_len` bytes each.
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        max_report_len: usize,
        spawner: Arc<dyn Spawn>,
        sink: impl ReportSink,
    ) -> Result<Self, TryReserveError> {
        let capacity = capacity.max(2);
        let mut slots: Vec<Vec<u8>> = Vec::new();
        slots.try_reserve_exact(capacity)?;
        for _ in 0..capacity {
            let mut slot = Vec::new();
            slot.try_reserve_exact(max_report_len)?;
            slots.push(slot);
        }

        Ok(Self {
            shared: Arc::new(Shared {
                name: name.into(),
                max_report_len,
                ring: Mutex::new(Ring {
                    slots,
                    head: 0,
                    tail: 0,
                    drain_pending: false,
                    draining_on: None,
                    closed: false,
                }),
                idle: Condvar::new(),
                dropped: AtomicU64::new(0),
                sink: Box::new(sink),
                spawner,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Copies `report` into the ring.
    ///
    /// Oversized reports, a full ring and a closed queue all drop the report with a
    /// log line; the producer is never blocked or told.
    pub fn push(&self, report: &[u8]) {
        let shared = &self.shared;
        if report.len() > shared.max_report_len {
            shared.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                queue = %shared.name,
                len = report.len(),
                max = shared.max_report_len,
                "report too large, dropped"
            );
            return;
        }

        let schedule = {
            let mut ring = shared.ring.lock();
            if ring.closed {
                shared.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(queue = %shared.name, "queue closed, report dropped");
                return;
            }
            let next = ring.advance(ring.head);
            if next == ring.tail {
                shared.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(queue = %shared.name, "queue is full, report dropped");
                return;
            }
            let head = ring.head;
            let slot = &mut ring.slots[head];
            slot.clear();
            slot.extend_from_slice(report);
            ring.head = next;

            let schedule = !ring.drain_pending;
            ring.drain_pending = true;
            schedule
        };

        if schedule {
            let task_shared = Arc::clone(shared);
            if let Err(task) = shared.spawner.spawn(Box::new(move || drain(&task_shared))) {
                drop(task);
                error!(queue = %shared.name, "drain task rejected, reports stay buffered");
                let mut ring = shared.ring.lock();
                ring.drain_pending = false;
                shared.idle.notify_all();
            }
        }
    }

    /// Live reports not yet consumed (the one being consumed counts).
    pub fn len(&self) -> usize {
        self.shared.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reports dropped since creation.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// `true` while a drain task is scheduled or running.
    pub fn drain_pending(&self) -> bool {
        self.shared.ring.lock().drain_pending
    }

    pub fn is_closed(&self) -> bool {
        self.shared.ring.lock().closed
    }

    /// Stops the queue: later pushes are dropped, buffered reports are discarded and
    /// any pending or running drain is awaited before returning.
    ///
    /// Called from inside this queue's own sink it cannot wait; the drain then exits
    /// after the current report.
    pub fn close(&self) {
        let shared = &self.shared;
        let mut ring = shared.ring.lock();
        ring.closed = true;
        let current = std::thread::current().id();
        while ring.drain_pending && ring.draining_on != Some(current) {
            shared.idle.wait(&mut ring);
        }
        if !ring.drain_pending {
            ring.tail = ring.head;
        }
    }
}

/// Ends a drain, also when the sink unwinds: clears the pending flag and wakes
/// `close()`. A report whose sink panicked is skipped.
struct DrainFinish<'a>(&'a Shared);

impl Drop for DrainFinish<'_> {
    fn drop(&mut self) {
        let shared = self.0;
        let mut ring = shared.ring.lock();
        if std::thread::panicking() && ring.head != ring.tail {
            error!(queue = %shared.name, "sink panicked, report skipped");
            ring.tail = ring.advance(ring.tail);
        }
        if ring.closed {
            ring.tail = ring.head;
        }
        ring.draining_on = None;
        ring.drain_pending = false;
        shared.idle.notify_all();
    }
}

fn drain(shared: &Arc<Shared>) {
    let _finish = DrainFinish(shared);
    let mut scratch = Vec::with_capacity(shared.max_report_len);
    let mut ring = shared.ring.lock();
    ring.draining_on = Some(std::thread::current().id());

    while !ring.closed && ring.head != ring.tail {
        scratch.clear();
        let tail = ring.tail;
        scratch.extend_from_slice(&ring.slots[tail]);

        MutexGuard::unlocked(&mut ring, || shared.sink.consume(&scratch));

        ring.tail = ring.advance(ring.tail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{InlineSpawn, Task, TaskPool};
    use std::time::{Duration, Instant};

    /// Records tasks instead of running them.
    #[derive(Default)]
    struct ManualSpawn {
        tasks: Mutex<Vec<Task>>,
    }

    impl ManualSpawn {
        fn pending(&self) -> usize {
            self.tasks.lock().len()
        }

        fn run_all(&self) {
            let tasks: Vec<Task> = self.tasks.lock().drain(..).collect();
            for task in tasks {
                task();
            }
        }
    }

    impl Spawn for ManualSpawn {
        fn spawn(&self, task: Task) -> Result<(), Task> {
            self.tasks.lock().push(task);
            Ok(())
        }
    }

    fn recording_queue(
        capacity: usize,
        spawner: Arc<dyn Spawn>,
    ) -> (ReportQueue, Arc<Mutex<Vec<Vec<u8>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let queue = ReportQueue::new("test", capacity, 8, spawner, move |r: &[u8]| {
            sink_seen.lock().push(r.to_vec())
        })
        .unwrap();
        (queue, seen)
    }

    #[test]
    fn schedules_one_drain_per_empty_to_nonempty_transition() {
        let spawner = Arc::new(ManualSpawn::default());
        let (queue, seen) = recording_queue(8, spawner.clone());

        for i in 0..5u8 {
            queue.push(&[i]);
        }
        assert_eq!(spawner.pending(), 1);
        assert!(queue.drain_pending());

        spawner.run_all();
        assert_eq!(seen.lock().len(), 5);
        assert!(!queue.drain_pending());

        queue.push(&[9]);
        assert_eq!(spawner.pending(), 1);
    }

    #[test]
    fn full_ring_drops_the_capacity_th_push() {
        let spawner = Arc::new(ManualSpawn::default());
        let (queue, seen) = recording_queue(4, spawner.clone());

        for i in 0..4u8 {
            queue.push(&[i]);
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 1);

        spawner.run_all();
        assert_eq!(*seen.lock(), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn oversized_report_is_dropped() {
        let (queue, seen) = recording_queue(4, Arc::new(InlineSpawn));
        queue.push(&[0u8; 9]);
        queue.push(&[1u8; 8]);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(*seen.lock(), vec![vec![1u8; 8]]);
    }

    #[test]
    fn reports_keep_embedded_zero_bytes() {
        let (queue, seen) = recording_queue(4, Arc::new(InlineSpawn));
        queue.push(&[0x10, 0x00, 0x00, 0x00]);
        assert_eq!(*seen.lock(), vec![vec![0x10, 0x00, 0x00, 0x00]]);
    }

    #[test]
    fn close_discards_buffered_reports_and_rejects_new_ones() {
        let spawner = Arc::new(ManualSpawn::default());
        let (queue, seen) = recording_queue(4, spawner.clone());
        queue.push(&[1]);
        queue.push(&[2]);

        // The scheduled drain has not run yet; close must still return once it has.
        let closer = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.close())
        };
        while !queue.is_closed() {
            std::thread::yield_now();
        }
        spawner.run_all();
        closer.join().unwrap();

        assert!(seen.lock().is_empty());
        assert!(queue.is_empty());
        queue.push(&[3]);
        assert!(queue.is_empty());
        assert_eq!(spawner.pending(), 0);
    }

    #[test]
    fn close_from_own_sink_does_not_deadlock() {
        let slot: Arc<Mutex<Option<ReportQueue>>> = Arc::new(Mutex::new(None));
        let sink_slot = Arc::clone(&slot);
        let queue = ReportQueue::new("self-close", 4, 8, Arc::new(InlineSpawn), move |_: &[u8]| {
            if let Some(q) = sink_slot.lock().as_ref() {
                q.close();
            }
        })
        .unwrap();
        *slot.lock() = Some(queue.clone());

        queue.push(&[1]);
        assert!(queue.is_closed());
        assert!(!queue.drain_pending());
        slot.lock().take();
    }

    #[test]
    fn push_during_running_drain_is_consumed_by_that_drain() {
        let spawner = Arc::new(ManualSpawn::default());
        let slot: Arc<Mutex<Option<ReportQueue>>> = Arc::new(Mutex::new(None));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (sink_slot, sink_seen) = (Arc::clone(&slot), Arc::clone(&seen));
        let queue = ReportQueue::new("re-push", 4, 8, spawner.clone(), move |r: &[u8]| {
            sink_seen.lock().push(r.to_vec());
            if r == [1] {
                if let Some(q) = sink_slot.lock().as_ref() {
                    q.push(&[2]);
                }
            }
        })
        .unwrap();
        *slot.lock() = Some(queue.clone());

        queue.push(&[1]);
        assert_eq!(spawner.pending(), 1);
        spawner.run_all();

        assert_eq!(spawner.pending(), 0);
        assert_eq!(*seen.lock(), vec![vec![1], vec![2]]);
        assert!(!queue.drain_pending());
        slot.lock().take();
    }

    #[test]
    fn rejected_drain_task_does_not_wedge_close() {
        let pool = TaskPool::new(1).unwrap();
        pool.shutdown();
        let (queue, seen) = recording_queue(4, Arc::new(pool));

        queue.push(&[0x10]);
        assert!(!queue.drain_pending());
        assert_eq!(queue.len(), 1);

        queue.close();
        assert!(queue.is_empty());
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn panicking_sink_releases_drain() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let pool = Arc::new(TaskPool::new(1).unwrap());
        let queue = ReportQueue::new("panicky", 4, 8, pool.clone(), move |r: &[u8]| {
            if r == [0xff] {
                panic!("handler failure");
            }
            sink_seen.lock().push(r.to_vec());
        })
        .unwrap();

        queue.push(&[0xff]);
        let deadline = Instant::now() + Duration::from_secs(5);
        while queue.drain_pending() {
            assert!(Instant::now() < deadline, "drain never finished");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(queue.is_empty());

        // Same single worker is still alive.
        queue.push(&[1]);
        while seen.lock().is_empty() {
            assert!(Instant::now() < deadline, "worker died with the sink");
            std::thread::sleep(Duration::from_millis(1));
        }
        queue.close();
        assert_eq!(*seen.lock(), vec![vec![1]]);
    }
}
