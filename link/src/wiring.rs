use crate::error::LinkError;
use async_trait::async_trait;
use ipnet::Ipv4Net;

/// Host network-configuration operations needed to wire an endpoint.
///
/// Every method maps onto one kernel facility; implementations must not add
/// retry or cleanup logic of their own. [`crate::IpCommandWiring`] drives the
/// live kernel, [`crate::MemoryWiring`] records operations in process.
#[async_trait]
pub trait LinkWiring: Send + Sync {
    /// Create a virtual interface pair. `host` stays in the host namespace;
    /// `peer` is destined to be moved into a sandbox by the caller.
    async fn create_pair(&self, host: &str, peer: &str) -> Result<(), LinkError>;

    async fn set_mtu(&self, name: &str, mtu: u32) -> Result<(), LinkError>;

    /// Bring the named link up.
    async fn set_up(&self, name: &str) -> Result<(), LinkError>;

    /// Install a route sending `dst` out through the named device, with no
    /// next hop.
    async fn add_route(&self, dst: Ipv4Net, device: &str) -> Result<(), LinkError>;

    /// Delete the named link. Deleting one end of a pair removes both.
    async fn delete_link(&self, name: &str) -> Result<(), LinkError>;

    /// Interface index of the named link, or `None` when no such link exists.
    async fn link_index(&self, name: &str) -> Result<Option<u32>, LinkError>;
}
