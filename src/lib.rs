//! lgmux: multiplexer for Logitech extended HID reports.
//!
//! A transport (one HID handle) is matched to a [`DeviceDriver`] and wrapped in a
//! [`Device`] with bounded inbound and outbound [`ReportQueue`]s. Wireless
//! receivers negotiate their device count, then create a logical device per slot
//! as keyboards and mice log on; reports addressed to a slot are routed to it.
//!
//! ```no_run
//! use lgmux::{Config, DeviceManager};
//!
//! let manager = DeviceManager::with_pool(Config::default()).unwrap();
//! # #[cfg(feature = "hid")]
//! # {
//! let api = hidapi::HidApi::new().unwrap();
//! for device in manager.attach_hid(&api) {
//!     println!("{}", device.name());
//! }
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backends;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod executor;
pub mod kinds;
pub mod logging;
pub mod manager;
pub mod metadata;
pub mod pending;
pub mod protocol;
pub mod queue;
pub mod receiver;
pub mod snapshot;
pub mod transport;

pub use backends::VirtualTransport;
pub use config::Config;
pub use device::{Device, DeviceContext, DeviceKind, DeviceState};
pub use driver::{DeviceDriver, DriverRegistry};
pub use error::{AttachError, DriverError, RegistryError, RequestError, ScrollModeError, TransportError};
pub use executor::{InlineSpawn, Spawn, TaskPool};
pub use kinds::{Clock, KeyboardDriver, MouseDriver, ScrollMode, ScrollModeSetting};
pub use manager::DeviceManager;
pub use metadata::DeviceMeta;
pub use protocol::{Bus, MatchKey, Report};
pub use queue::ReportQueue;
pub use receiver::{ReceiverDriver, ReceiverPhase, ReceiverState};
pub use snapshot::{DeviceStatus, Snapshot};
pub use transport::Transport;
