//! Application layer use cases for the daemon.
//!
//! # What use cases does the daemon have?
//!
//! - **`dispatch_event`** – Decides what happens to one input event: a layer
//!   switch, a macro, a button remap, suppression, or passthrough.  Output,
//!   command spawning, and time are reached through the `VirtualOutput`,
//!   `CommandRunner`, and `Clock` traits so the whole state machine runs in
//!   tests without a real device.
//!
//! - **`supervise_device`** – Owns the device session: connects to the
//!   physical device, polls it with a bounded wait, feeds events to the
//!   engine, and reconnects after an unplug until shutdown is requested.

pub mod dispatch_event;
pub mod supervise_device;
