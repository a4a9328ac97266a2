use lgmux::executor::{Spawn, Task};
use lgmux::ReportQueue;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;

/// Holds drain tasks until the test runs them.
#[derive(Default)]
struct Deferred(Mutex<Vec<Task>>);

impl Deferred {
    fn run_all(&self) -> usize {
        let tasks: Vec<_> = self.0.lock().drain(..).collect();
        let n = tasks.len();
        for task in tasks {
            task();
        }
        n
    }
}

impl Spawn for Deferred {
    fn spawn(&self, task: Task) -> Result<(), Task> {
        self.0.lock().push(task);
        Ok(())
    }
}

fn queue(capacity: usize) -> (ReportQueue, Arc<Deferred>, Arc<Mutex<Vec<Vec<u8>>>>) {
    let spawner = Arc::new(Deferred::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let queue = ReportQueue::new("prop", capacity, 16, spawner.clone(), move |r: &[u8]| {
        sink.lock().push(r.to_vec())
    })
    .unwrap();
    (queue, spawner, seen)
}

proptest! {
    #[test]
    fn delivers_in_order_up_to_capacity(
        capacity in 2usize..12,
        reports in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 0..24),
    ) {
        let (queue, spawner, seen) = queue(capacity);
        for report in &reports {
            queue.push(report);
        }

        let kept = reports.len().min(capacity - 1);
        prop_assert_eq!(queue.len(), kept);
        prop_assert_eq!(queue.dropped() as usize, reports.len() - kept);
        // One drain task per empty-to-non-empty transition.
        prop_assert_eq!(spawner.run_all(), usize::from(!reports.is_empty()));

        prop_assert_eq!(&*seen.lock(), &reports[..kept]);
        prop_assert!(queue.is_empty());
        prop_assert!(!queue.drain_pending());
    }

    #[test]
    fn interleaved_pushes_and_drains_keep_fifo(
        batches in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..4), 1..8),
    ) {
        let (queue, spawner, seen) = queue(8);
        let mut expected = Vec::new();
        for (i, batch) in batches.iter().enumerate() {
            for &b in batch {
                queue.push(&[i as u8, b]);
                expected.push(vec![i as u8, b]);
            }
            spawner.run_all();
        }
        prop_assert_eq!(&*seen.lock(), &expected);
        prop_assert_eq!(queue.dropped(), 0);
    }
}
