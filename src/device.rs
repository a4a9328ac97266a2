//! Logical devices.
//!
//! A [`Device`] is either *standalone* (it owns a transport plus an inbound and an
//! outbound [`ReportQueue`]) or *on a receiver* (it shares the receiver's outbound
//! queue and is fed directly by the receiver's dispatch). Per-kind state lives in
//! the tagged [`DeviceState`]; the tag decides which accessor returns `Some`.

use crate::config::Config;
use crate::driver::{DeviceDriver, DriverRegistry};
use crate::error::{AttachError, RequestError};
use crate::executor::Spawn;
use crate::kinds::keyboard::KeyboardState;
use crate::kinds::mouse::MouseState;
use crate::metadata::DeviceMeta;
use crate::protocol::{self, Command, Hex, Report};
use crate::queue::ReportQueue;
use crate::receiver::ReceiverState;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tracing::{error, trace, warn};

/// Shared services every device needs.
#[derive(Clone)]
pub struct DeviceContext {
    pub registry: Arc<DriverRegistry>,
    pub config: Arc<Config>,
    pub spawner: Arc<dyn Spawn>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Receiver,
    Keyboard,
    Mouse,
}

/// Per-kind state, selected by the driver that created the device.
pub enum DeviceState {
    Receiver(ReceiverState),
    Keyboard(KeyboardState),
    Mouse(MouseState),
}

impl DeviceState {
    pub fn kind(&self) -> DeviceKind {
        match self {
            DeviceState::Receiver(_) => DeviceKind::Receiver,
            DeviceState::Keyboard(_) => DeviceKind::Keyboard,
            DeviceState::Mouse(_) => DeviceKind::Mouse,
        }
    }
}

enum Link {
    Standalone {
        transport: Arc<dyn Transport>,
        inbound: ReportQueue,
    },
    OnReceiver {
        receiver: String,
    },
}

pub struct Device {
    name: String,
    device_number: u8,
    driver: Arc<dyn DeviceDriver>,
    outbound: ReportQueue,
    link: Link,
    state: DeviceState,
    ctx: DeviceContext,
    meta: DeviceMeta,
}

impl Device {
    /// Allocates a standalone device and its two queues. The transport is not
    /// started here.
    pub(crate) fn standalone(
        transport: Arc<dyn Transport>,
        driver: Arc<dyn DeviceDriver>,
        ctx: DeviceContext,
    ) -> Result<Arc<Self>, AttachError> {
        let name = format!("{} [{}]", driver.name(), transport.id());
        let queue_config = ctx.config.queue;
        let alloc_err = |_| AttachError::Allocation(transport.id().to_string());

        let target: Arc<OnceLock<Weak<Device>>> = Arc::new(OnceLock::new());
        let sink_target = Arc::clone(&target);
        let inbound = ReportQueue::new(
            format!("{name} in"),
            queue_config.capacity,
            queue_config.max_report_len,
            Arc::clone(&ctx.spawner),
            move |report: &[u8]| {
                if let Some(device) = sink_target.get().and_then(Weak::upgrade) {
                    device.dispatch(report);
                }
            },
        )
        .map_err(alloc_err)?;

        let writer = Arc::clone(&transport);
        let outbound = ReportQueue::new(
            format!("{name} out"),
            queue_config.capacity,
            queue_config.max_report_len,
            Arc::clone(&ctx.spawner),
            move |report: &[u8]| {
                if let Err(e) = writer.write(report) {
                    warn!(dev = %writer.id(), bytes = %Hex(report), error = %e, "transport write failed");
                }
            },
        )
        .map_err(alloc_err)?;

        let state = driver.new_state(&ctx);
        let device = Arc::new(Device {
            name,
            device_number: driver.standalone_device_number(),
            meta: transport.metadata(),
            driver,
            outbound,
            link: Link::Standalone { transport, inbound },
            state,
            ctx,
        });
        // Fresh cell; cannot already be set.
        let _ = target.set(Arc::downgrade(&device));
        Ok(device)
    }

    /// Creates a device for slot `device_number` behind `receiver`, sharing its
    /// outbound queue.
    pub(crate) fn on_receiver(
        receiver: &Device,
        driver: Arc<dyn DeviceDriver>,
        device_number: u8,
    ) -> Arc<Self> {
        let receiver_id = receiver.transport_id().unwrap_or(receiver.name()).to_string();
        let state = driver.new_state(&receiver.ctx);
        let meta = DeviceMeta {
            product_string: Some(driver.name().to_string()),
            ..receiver.meta.clone()
        };
        Arc::new(Device {
            name: format!("{} [{}#{}]", driver.name(), receiver_id, device_number),
            device_number,
            driver,
            outbound: receiver.outbound.clone(),
            link: Link::OnReceiver {
                receiver: receiver_id,
            },
            state,
            ctx: receiver.ctx.clone(),
            meta,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device number written to byte 1 of this device's commands.
    pub fn device_number(&self) -> u8 {
        self.device_number
    }

    pub fn driver(&self) -> &Arc<dyn DeviceDriver> {
        &self.driver
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn kind(&self) -> DeviceKind {
        self.state.kind()
    }

    pub fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    pub fn metadata(&self) -> &DeviceMeta {
        &self.meta
    }

    /// Transport handle id; `None` for devices behind a receiver.
    pub fn transport_id(&self) -> Option<&str> {
        match &self.link {
            Link::Standalone { transport, .. } => Some(transport.id()),
            Link::OnReceiver { .. } => None,
        }
    }

    /// Id of the receiver transport this device sits behind.
    pub fn receiver_id(&self) -> Option<&str> {
        match &self.link {
            Link::Standalone { .. } => None,
            Link::OnReceiver { receiver } => Some(receiver),
        }
    }

    pub fn as_receiver(&self) -> Option<&ReceiverState> {
        match &self.state {
            DeviceState::Receiver(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_keyboard(&self) -> Option<&KeyboardState> {
        match &self.state {
            DeviceState::Keyboard(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_mouse(&self) -> Option<&MouseState> {
        match &self.state {
            DeviceState::Mouse(state) => Some(state),
            _ => None,
        }
    }

    /// Enqueues a command on the outbound queue.
    pub fn send(&self, command: &Command) {
        self.send_raw(command.as_bytes());
    }

    /// Enqueues raw output bytes on the outbound queue.
    pub fn send_raw(&self, report: &[u8]) {
        trace!(device = %self.name, bytes = %Hex(report), "queue out");
        self.outbound.push(report);
    }

    pub fn outbound(&self) -> &ReportQueue {
        &self.outbound
    }

    pub fn inbound(&self) -> Option<&ReportQueue> {
        match &self.link {
            Link::Standalone { inbound, .. } => Some(inbound),
            Link::OnReceiver { .. } => None,
        }
    }

    pub(crate) fn transport(&self) -> Option<&Arc<dyn Transport>> {
        match &self.link {
            Link::Standalone { transport, .. } => Some(transport),
            Link::OnReceiver { .. } => None,
        }
    }

    /// Transport callback body: queues extended reports, ignores the rest.
    pub(crate) fn raw_event(&self, report: &[u8]) {
        if !protocol::is_extended(report) {
            return;
        }
        if let Some(inbound) = self.inbound() {
            inbound.push(report);
        }
    }

    /// Hands one inbound report to the driver.
    pub(crate) fn dispatch(self: &Arc<Self>, bytes: &[u8]) {
        match Report::parse(bytes) {
            Ok(report) => {
                trace!(device = %self.name, bytes = %Hex(bytes), "dispatch");
                self.driver.receive(self, report);
            }
            Err(e) => error!(device = %self.name, bytes = %Hex(bytes), error = %e, "malformed report dropped"),
        }
    }

    /// Wakes every waiter of every field.
    pub fn wake(&self) {
        match &self.state {
            DeviceState::Receiver(_) => {}
            DeviceState::Keyboard(state) => state.notify_all(),
            DeviceState::Mouse(state) => state.notify_all(),
        }
    }

    /// Fails outstanding and future blocking requests.
    pub fn interrupt_requests(&self) {
        match &self.state {
            DeviceState::Receiver(_) => {}
            DeviceState::Keyboard(state) => state.interrupt_all(),
            DeviceState::Mouse(state) => state.interrupt_all(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.ctx.config.requests.timeout()
    }

    /// Stops inbound dispatch, waiting for an in-flight drain.
    pub(crate) fn close_inbound(&self) {
        if let Some(inbound) = self.inbound() {
            inbound.close();
        }
    }

    /// Closes both queues of a standalone device. Devices on a receiver share the
    /// receiver's queues and leave them alone.
    pub(crate) fn release(&self) {
        if let Link::Standalone { inbound, .. } = &self.link {
            inbound.close();
            self.outbound.close();
        }
    }

    /// Reads the battery level in percent. Blocks until the device replies.
    pub fn battery(&self) -> Result<u8, RequestError> {
        let pending = match &self.state {
            DeviceState::Keyboard(state) => &state.battery,
            DeviceState::Mouse(state) => &state.battery,
            DeviceState::Receiver(_) => return Err(RequestError::Unsupported(self.name.clone())),
        };
        pending.request(&self.name, self.request_timeout(), || {
            self.send(&protocol::get_battery(self.device_number))
        })
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("device_number", &self.device_number)
            .finish()
    }
}
