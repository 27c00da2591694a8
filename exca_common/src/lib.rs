//! EXCA Common Library
//!
//! Shared definitions for the excavator hardware bridge: the joint set,
//! configuration loading, the transport seam and the values exchanged with
//! the joint controller.
//!
//! # Module Structure
//!
//! - [`joint`] - Joint enumeration and the `JointMap` arena keyed by it
//! - [`hal`] - Bridge configuration, transport trait and exchange types
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Numeric limits and default paths
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use exca_common::prelude::*;
//!
//! let mut positions = JointMap::splat(0.0);
//! positions[Joint::Turntable] = 1.5;
//! assert_eq!(positions[Joint::Turntable], 1.5);
//! ```

pub mod config;
pub mod consts;
pub mod hal;
pub mod joint;
pub mod prelude;
