//! Physical transport seam.
//!
//! A transport is one opened HID handle. The core only needs to start it with an
//! inbound callback, stop it, and write raw output reports to it; enumeration and
//! opening belong to the backends.

use crate::error::TransportError;
use crate::metadata::DeviceMeta;
use crate::protocol::MatchKey;
use std::sync::Arc;

/// Called by a started transport with every raw input report, on the transport's
/// own thread. Must not block.
pub type InboundCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

pub trait Transport: Send + Sync {
    /// Stable handle identity (an OS path for real devices).
    fn id(&self) -> &str;

    fn match_key(&self) -> MatchKey;

    /// What the backend knows about the device.
    fn metadata(&self) -> DeviceMeta {
        let key = self.match_key();
        DeviceMeta {
            bus: Some(key.bus),
            vid: Some(key.vendor),
            pid: Some(key.product),
            path: Some(self.id().to_string()),
            ..DeviceMeta::default()
        }
    }

    /// Begins delivering input reports to `inbound`.
    fn start(&self, inbound: InboundCallback) -> Result<(), TransportError>;

    /// Stops delivery and drops the registered callback. Idempotent.
    fn stop(&self);

    /// Writes one output report (report id first). Returns bytes written.
    fn write(&self, report: &[u8]) -> Result<usize, TransportError>;
}
