//! Transport backends for `lgmux`.
//!
//! Implementations of [`Transport`](crate::transport::Transport).
//!
//! # Feature flags
//! - **`hid`**: enables the hidapi backend (default).
//! - **`debug-log`**: logs every opened device and every raw read at trace level.
//!
//! [`virtual_transport`] is always available; it backs the tests and dry runs.

#[cfg(feature = "hid")]
#[cfg_attr(docsrs, doc(cfg(feature = "hid")))]
pub mod hid;

pub mod virtual_transport;

pub use virtual_transport::VirtualTransport;
