//! Name → transport factory lookup.
//!
//! The binary picks its outbound transport by the `transport` key of
//! `bridge.toml` (or `--transport`). Each built-in transport registers a
//! factory under its name; [`BridgeCore::from_registry`] resolves the name
//! and hands the factory the bridge's [`TransportContext`].
//!
//! [`BridgeCore::from_registry`]: crate::core::BridgeCore::from_registry

use crate::sensor_cache::SensorInputs;
use exca_common::hal::config::JointConfig;
use exca_common::hal::transport::{HalError, Transport};
use exca_common::joint::JointMap;
use std::collections::BTreeMap;

/// Everything a transport needs at construction.
#[derive(Debug, Clone)]
pub struct TransportContext {
    /// Handle for pushing inbound samples into the bridge
    pub inputs: SensorInputs,
    /// Per-joint configuration the bridge was built with
    pub joints: JointMap<JointConfig>,
}

/// Builds a transport wired to one bridge.
pub type TransportFactory = fn(&TransportContext) -> Box<dyn Transport>;

/// Transport factories keyed by configuration name, listed in name order.
#[derive(Default)]
pub struct TransportRegistry {
    factories: BTreeMap<&'static str, TransportFactory>,
}

impl TransportRegistry {
    /// Registry with nothing in it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every transport compiled into this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::drivers::register_all_transports(&mut registry);
        registry
    }

    /// Add `factory` under `name`.
    ///
    /// # Panics
    /// Two transports claiming one name is a build mistake, so a duplicate panics.
    pub fn register(&mut self, name: &'static str, factory: TransportFactory) {
        let previous = self.factories.insert(name, factory);
        assert!(previous.is_none(), "Transport '{name}' is already registered");
    }

    /// Factory registered under `name`.
    ///
    /// # Errors
    /// `HalError::TransportNotFound` naming the requested and the available transports.
    pub fn resolve(&self, name: &str) -> Result<TransportFactory, HalError> {
        self.factories.get(name).copied().ok_or_else(|| {
            let available: Vec<_> = self.names().collect();
            HalError::TransportNotFound(format!("{name} (available: {})", available.join(", ")))
        })
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }
}
