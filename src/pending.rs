//! Blocking request/response slots.
//!
//! Each awaited field of a device (battery level, clock, scroll mode) gets its own
//! [`Pending`]: a value that is "unknown" until an inbound report fills it, paired
//! with its own condition variable. Concurrent requesters of the same field share
//! the slot; the reads are idempotent so whichever reply lands first satisfies all.
//!
//! Requests block the calling thread. They must never be issued from a drain task:
//! the reply can only be delivered by a drain task.

use crate::error::RequestError;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

struct Slot<T> {
    value: Option<T>,
    interrupted: bool,
}

pub struct Pending<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T: Clone> Pending<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                interrupted: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Last known value.
    pub fn get(&self) -> Option<T> {
        self.slot.lock().value.clone()
    }

    /// Stores a reply and wakes every waiter of this field.
    pub fn fulfill(&self, value: T) {
        self.slot.lock().value = Some(value);
        self.ready.notify_all();
    }

    /// Wakes waiters without changing the value.
    pub fn notify(&self) {
        self.ready.notify_all();
    }

    /// Fails current and future requests with [`RequestError::Interrupted`].
    pub fn interrupt(&self) {
        self.slot.lock().interrupted = true;
        self.ready.notify_all();
    }

    pub fn is_interrupted(&self) -> bool {
        self.slot.lock().interrupted
    }

    /// Resets the field to unknown, runs `send`, then waits for a reply.
    pub fn request(
        &self,
        device: &str,
        timeout: Duration,
        send: impl FnOnce(),
    ) -> Result<T, RequestError> {
        {
            let mut slot = self.slot.lock();
            if slot.interrupted {
                return Err(RequestError::Interrupted(device.to_string()));
            }
            slot.value = None;
        }
        send();
        self.wait(device, timeout)
    }

    /// Returns the cached value if known; otherwise runs `send` and waits.
    pub fn request_cached(
        &self,
        device: &str,
        timeout: Duration,
        send: impl FnOnce(),
    ) -> Result<T, RequestError> {
        {
            let slot = self.slot.lock();
            if slot.interrupted {
                return Err(RequestError::Interrupted(device.to_string()));
            }
            if let Some(value) = &slot.value {
                return Ok(value.clone());
            }
        }
        send();
        self.wait(device, timeout)
    }

    fn wait(&self, device: &str, timeout: Duration) -> Result<T, RequestError> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        loop {
            if slot.interrupted {
                return Err(RequestError::Interrupted(device.to_string()));
            }
            if let Some(value) = &slot.value {
                return Ok(value.clone());
            }
            if self.ready.wait_until(&mut slot, deadline).timed_out() {
                return match &slot.value {
                    Some(value) => Ok(value.clone()),
                    None => Err(RequestError::TimedOut {
                        device: device.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                };
            }
        }
    }
}

impl<T: Clone> Default for Pending<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn reply_from_another_thread_unblocks_request() {
        let battery = Arc::new(Pending::<u8>::new());
        battery.fulfill(10);

        let responder = Arc::clone(&battery);
        let value = battery
            .request("mouse", Duration::from_secs(5), move || {
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(20));
                    responder.fulfill(77);
                });
            })
            .unwrap();
        assert_eq!(value, 77);
    }

    #[test]
    fn request_resets_stale_value() {
        let battery = Pending::<u8>::new();
        battery.fulfill(50);
        let err = battery
            .request("mouse", Duration::from_millis(10), || {})
            .unwrap_err();
        assert!(matches!(err, RequestError::TimedOut { timeout_ms: 10, .. }));
        assert_eq!(battery.get(), None);
    }

    #[test]
    fn cached_request_skips_send_when_known() {
        let mode = Pending::<u8>::new();
        mode.fulfill(3);
        let mut sent = false;
        let value = mode
            .request_cached("mouse", Duration::from_millis(10), || sent = true)
            .unwrap();
        assert_eq!(value, 3);
        assert!(!sent);
    }

    #[test]
    fn interrupt_surfaces_distinct_error() {
        let clock = Arc::new(Pending::<u32>::new());
        let waiter = {
            let clock = Arc::clone(&clock);
            std::thread::spawn(move || clock.request("keyboard", Duration::from_secs(10), || {}))
        };
        std::thread::sleep(Duration::from_millis(20));
        clock.interrupt();
        assert_eq!(
            waiter.join().unwrap(),
            Err(RequestError::Interrupted("keyboard".to_string()))
        );
        assert!(clock.request("keyboard", Duration::from_secs(1), || {}).is_err());
    }

    #[test]
    fn unrelated_notify_does_not_end_wait() {
        let battery = Arc::new(Pending::<u8>::new());
        let notifier = Arc::clone(&battery);
        let result = battery.request("mouse", Duration::from_millis(60), move || {
            std::thread::spawn(move || {
                for _ in 0..3 {
                    notifier.notify();
                    std::thread::sleep(Duration::from_millis(5));
                }
            });
        });
        assert!(matches!(result, Err(RequestError::TimedOut { .. })));
    }
}
