//! Hardware device drivers
//!
//! This module contains drivers for the devices the loader talks to.

pub mod ata;
pub mod serial;

pub use ata::{AtaPio, PortBus};
