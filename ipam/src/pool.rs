use crate::error::IpamError;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub id: String,
    pub subnet: Ipv4Net,
    pub gateway: Ipv4Addr,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            id: "routed".to_string(),
            subnet: Ipv4Net::new_assert(Ipv4Addr::new(100, 64, 0, 0), 10),
            gateway: Ipv4Addr::new(100, 64, 0, 1),
        }
    }
}

/// A single CIDR block handing out individual host addresses.
///
/// The gateway is reserved at construction and can never be allocated or
/// released. The pool itself is process-scoped: `release_pool` validates the
/// id but tears nothing down.
#[derive(Debug)]
pub struct AddressPool {
    config: PoolConfig,
    allocated: HashSet<Ipv4Addr>,
}

impl AddressPool {
    pub fn new(config: PoolConfig) -> Result<Self, IpamError> {
        if !config.subnet.contains(&config.gateway) {
            return Err(IpamError::InvalidAddress(format!(
                "gateway {} lies outside subnet {}",
                config.gateway, config.subnet
            )));
        }

        let mut allocated = HashSet::new();
        allocated.insert(config.gateway);

        Ok(Self { config, allocated })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn subnet(&self) -> Ipv4Net {
        self.config.subnet
    }

    pub fn gateway(&self) -> Ipv4Addr {
        self.config.gateway
    }

    /// Allocate the first free host address in the subnet.
    ///
    /// The scan is bounded by the subnet size, so exhaustion reports cleanly
    /// instead of spinning. Callers get no ordering guarantee.
    pub fn request_address(&mut self) -> Result<Ipv4Addr, IpamError> {
        for candidate in self.config.subnet.hosts() {
            if !self.allocated.contains(&candidate) {
                self.allocated.insert(candidate);
                tracing::debug!(
                    "allocated {} ({} addresses in use)",
                    candidate,
                    self.allocated.len()
                );
                return Ok(candidate);
            }
        }

        Err(IpamError::PoolExhausted)
    }

    /// Release an address back to the pool. Releasing an address that was
    /// never allocated is a no-op; the gateway stays reserved.
    pub fn release_address(&mut self, address: Ipv4Addr) {
        if address == self.config.gateway {
            tracing::debug!("ignoring release of reserved gateway {}", address);
            return;
        }

        if !self.allocated.remove(&address) {
            tracing::debug!("released address {} was not allocated", address);
        }
    }

    pub fn release_pool(&self, pool_id: &str) -> Result<(), IpamError> {
        if pool_id != self.config.id {
            return Err(IpamError::UnknownPool(pool_id.to_string()));
        }
        Ok(())
    }
}
