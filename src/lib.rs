//! Control core of a battery-powered vital-sign gateway.
//!
//! The gateway keeps a small whitelist of wearable sensors, one per service
//! class, registers and deletes them on request, and between deep sleeps
//! collects the latest temperature reading and classifies it.
//!
//! - [`protocol`] - advertisement frame and fixed-point reading codec
//! - [`classifier`] - temperature severity classification
//! - [`whitelist`] - per-class registry of bound sensors
//! - [`retained`] - state that survives deep sleep
//! - [`processor`], [`mode`], [`gateway`] - the event-driven core
//! - [`scanner`], [`manager`] - the btleplug radio and hosted dispatcher

pub mod classifier;
pub mod config;
pub mod gateway;
pub mod hal;
pub mod manager;
pub mod messages;
pub mod mode;
pub mod processor;
pub mod protocol;
pub mod retained;
pub mod scanner;
pub mod whitelist;

#[cfg(test)]
mod testing;

pub use classifier::Severity;
pub use gateway::{Gateway, GatewaySettings};
pub use messages::{Activation, RadioEvent, WakeCause};
