//! Registered protocol sources.

use std::sync::Arc;

use solshield_chain::{Protocol, RpcTransport};
use tracing::info;

use crate::config::MonitorConfig;
use crate::source::ProtocolAdapter;

/// The fixed set of protocol sources, in registration order.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    adapters: Vec<ProtocolAdapter>,
}

impl SourceRegistry {
    /// Register every enabled protocol, in [`Protocol::ALL`] order.
    pub fn from_config(config: &MonitorConfig, transport: Arc<dyn RpcTransport>) -> Self {
        let reserves = Arc::new(config.reserves.clone());
        let adapters = Protocol::ALL
            .into_iter()
            .filter(|p| config.sources.is_enabled(*p))
            .map(|p| {
                ProtocolAdapter::new(config.sources.descriptor(p), transport.clone())
                    .with_fallback(config.aggregation.fallback)
                    .with_reserves(reserves.clone())
            })
            .collect::<Vec<_>>();

        info!(
            sources = ?adapters.iter().map(|a| a.protocol()).collect::<Vec<_>>(),
            "Registered protocol sources"
        );

        Self { adapters }
    }

    /// Build from explicit adapters. Order is taken as given.
    pub fn from_adapters(adapters: Vec<ProtocolAdapter>) -> Self {
        Self { adapters }
    }

    pub fn adapters(&self) -> &[ProtocolAdapter] {
        &self.adapters
    }

    pub fn get(&self, protocol: Protocol) -> Option<&ProtocolAdapter> {
        self.adapters.iter().find(|a| a.protocol() == protocol)
    }

    /// Working set for an optional case-insensitive protocol filter.
    ///
    /// An unrecognized filter selects nothing.
    pub fn select(&self, filter: Option<&str>) -> Vec<&ProtocolAdapter> {
        match filter {
            None => self.adapters.iter().collect(),
            Some(name) => match Protocol::parse(name) {
                Some(protocol) => self.get(protocol).into_iter().collect(),
                None => Vec::new(),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
