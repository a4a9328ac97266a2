//! In-memory transport.
//!
//! [`VirtualTransport`] records every output report written to it and lets the
//! host inject input reports as if the device had sent them. An optional responder
//! turns writes into replies, so request/response flows can be exercised without
//! hardware.

use crate::error::TransportError;
use crate::protocol::MatchKey;
use crate::transport::{InboundCallback, Transport};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

type Responder = Box<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

pub struct VirtualTransport {
    id: String,
    key: MatchKey,
    inbound: Mutex<Option<InboundCallback>>,
    writes: Mutex<Vec<Vec<u8>>>,
    responder: Mutex<Option<Responder>>,
    fail_start: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl VirtualTransport {
    pub fn new(id: &str, key: MatchKey) -> Self {
        Self {
            id: id.to_string(),
            key,
            inbound: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            responder: Mutex::new(None),
            fail_start: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    /// Makes the next `start` fail with `Disconnected`.
    pub fn fail_next_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    /// Replies to every write for which `respond` returns `Some`.
    pub fn respond_with(&self, respond: impl Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static) {
        *self.responder.lock() = Some(Box::new(respond));
    }

    /// Delivers `report` as if the device had sent it. Returns `false` when stopped.
    pub fn inject(&self, report: &[u8]) -> bool {
        let callback = self.inbound.lock().clone();
        match callback {
            Some(callback) => {
                callback(report);
                true
            }
            None => false,
        }
    }

    /// Output reports written so far.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    pub fn take_writes(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.writes.lock())
    }

    pub fn is_started(&self) -> bool {
        self.inbound.lock().is_some()
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Transport for VirtualTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn match_key(&self) -> MatchKey {
        self.key
    }

    fn start(&self, inbound: InboundCallback) -> Result<(), TransportError> {
        if self.fail_start.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Disconnected(self.id.clone()));
        }
        let mut slot = self.inbound.lock();
        if slot.is_some() {
            return Err(TransportError::AlreadyStarted(self.id.clone()));
        }
        *slot = Some(inbound);
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        if self.inbound.lock().take().is_some() {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn write(&self, report: &[u8]) -> Result<usize, TransportError> {
        if !self.is_started() {
            return Err(TransportError::NotStarted(self.id.clone()));
        }
        self.writes.lock().push(report.to_vec());

        let reply = self.responder.lock().as_ref().and_then(|respond| respond(report));
        if let Some(reply) = reply {
            self.inject(&reply);
        }
        Ok(report.len())
    }
}
