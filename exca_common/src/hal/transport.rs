//! Transport trait and error types.
//!
//! This module defines:
//! - `HalError` enum - Error types for bridge operations
//! - `Transport` trait - Outbound seam towards the actuator drivers
//!
//! Inbound samples do not go through this trait: transports (and any other
//! producer) push them into the bridge through a cloneable input handle
//! owned by the bridge crate.

use crate::hal::types::RawCommand;
use thiserror::Error;

/// Error types for bridge operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Transport could not deliver a command
    #[error("Transport error: {0}")]
    TransportError(String),

    /// No transport registered under the requested name
    #[error("Transport not found: {0}")]
    TransportNotFound(String),
}

/// Outbound side of the message transport.
///
/// The bridge calls `send()` once per joint per tick from the control loop.
///
/// # Timing Contracts
///
/// | Operation | Max Duration | RT Constraint |
/// |-----------|--------------|---------------|
/// | `send()` | a fraction of the tick | **HARD** (no blocking I/O) |
/// | `shutdown()` | 1 second | None (post-loop) |
pub trait Transport: Send {
    /// Returns the transport's unique identifier (e.g., "simulation", "canopen").
    fn name(&self) -> &'static str;

    /// Forward one raw command to the joint's actuator driver.
    ///
    /// # Errors
    /// Return `HalError::TransportError` if the command could not be queued.
    /// The bridge logs and counts the failure; it never retries within a tick.
    fn send(&mut self, command: RawCommand) -> Result<(), HalError>;

    /// Release transport resources.
    ///
    /// Default implementation does nothing.
    fn shutdown(&mut self) -> Result<(), HalError> {
        Ok(())
    }
}
