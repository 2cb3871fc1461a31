//! Last-known device state of the hub.
//!
//! The [`StateStore`] holds the most recent full system state received from
//! the hub as one immutable [`DeviceStateSnapshot`], optionally mirrored to a
//! JSON file so a restarted bridge can serve it before the hub answers.

pub mod render;
pub mod snapshot;
pub mod store;

pub use snapshot::{DeviceStateSnapshot, DeviceSummary};
pub use store::{StateStore, StoreError};
