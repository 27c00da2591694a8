//! # EXCA HAL Library
//!
//! Hardware bridge between the robot's asynchronous actuator channels and a
//! fixed-rate joint controller.
//!
//! Sensor producers push raw samples at their own rate; once per tick the
//! control loop reads a calibrated joint state, runs the controller and
//! writes clamped commands back out through a pluggable [`Transport`].
//!
//! # Module Structure
//!
//! - [`calibration`] - Two-point raw ↔ joint-space mapping
//! - [`velocity`] - Quadrature count accumulation and velocity estimation
//! - [`sensor_cache`] - Latest-value cache and the producer input handle
//! - [`clamp`] - Command range clamp, safe-state values, slew limiter
//! - [`core`] - `BridgeCore` (read / write / safe-state / rezero)
//! - [`cycle`] - Fixed-rate `ControlLoop` and the `JointController` seam
//! - [`transport_registry`] - Transport factory registration
//! - [`drivers`] - Built-in transports
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         exca_hal                                 │
//! │  producers ──► SensorInputs ──► SensorCache / VelocityEstimator  │
//! │                                        │                         │
//! │                                        ▼ read()                  │
//! │  ┌──────────────┐   state    ┌──────────────┐                    │
//! │  │  Joint       │◄───────────│  BridgeCore  │◄── Calibration     │
//! │  │  Controller  │───────────►│              │                    │
//! │  └──────────────┘  commands  └──────┬───────┘                    │
//! │                                     │ write(): clamp → raw       │
//! │                                     ▼                            │
//! │                            ┌────────────────┐                    │
//! │                            │  Transport     │ (trait object)     │
//! │                            └────────────────┘                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`Transport`]: exca_common::hal::transport::Transport

#![deny(missing_docs)]

pub mod calibration;
pub mod clamp;
pub mod core;
pub mod cycle;
pub mod drivers;
pub mod sensor_cache;
pub mod transport_registry;
pub mod velocity;

// Re-export key types for convenience
pub use crate::calibration::CalibrationTable;
pub use crate::core::BridgeCore;
pub use crate::cycle::{ControlLoop, HoldController, JointController, TimingStats};
pub use crate::sensor_cache::{SensorCache, SensorInputs};
pub use crate::transport_registry::{TransportContext, TransportRegistry};
pub use crate::velocity::VelocityEstimator;
