//! Hardware bridge configuration, transport seam and exchange types.
//!
//! This module contains the types shared between the bridge core and the
//! crates that sit on either side of it.

pub mod config;
pub mod transport;
pub mod types;
