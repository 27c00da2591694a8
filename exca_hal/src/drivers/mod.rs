//! Built-in transports.
//!
//! - [`simulation`] - Loopback transport for development and testing
//!
//! # Adding New Transports
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the `Transport` trait from `exca_common::hal::transport`
//! 3. Register its factory in [`register_all_transports`]

pub mod simulation;

use crate::transport_registry::TransportRegistry;

/// Register every built-in transport in `registry`.
pub fn register_all_transports(registry: &mut TransportRegistry) {
    registry.register(simulation::TRANSPORT_NAME, simulation::create_transport);
}
