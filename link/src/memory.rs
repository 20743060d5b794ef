use crate::error::LinkError;
use crate::wiring::LinkWiring;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Recorded state of one in-memory link.
#[derive(Debug, Clone)]
pub struct MemoryLink {
    pub index: u32,
    pub peer: Option<String>,
    pub mtu: Option<u32>,
    pub up: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_index: u32,
    links: HashMap<String, MemoryLink>,
    routes: HashMap<Ipv4Net, String>,
}

/// Wiring that records links and routes in process instead of touching the
/// kernel, with the same error surface as the live implementation. Used by
/// driver tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryWiring {
    state: Mutex<MemoryState>,
}

impl MemoryWiring {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn link(&self, name: &str) -> Option<MemoryLink> {
        self.state.lock().await.links.get(name).cloned()
    }

    /// Device currently routing `dst`, if any.
    pub async fn route(&self, dst: Ipv4Net) -> Option<String> {
        self.state.lock().await.routes.get(&dst).cloned()
    }

    pub async fn link_count(&self) -> usize {
        self.state.lock().await.links.len()
    }
}

#[async_trait]
impl LinkWiring for MemoryWiring {
    async fn create_pair(&self, host: &str, peer: &str) -> Result<(), LinkError> {
        let mut state = self.state.lock().await;

        for name in [host, peer] {
            if state.links.contains_key(name) {
                return Err(LinkError::CreateFailed(format!(
                    "link {} already exists",
                    name
                )));
            }
        }

        state.next_index += 1;
        let host_index = state.next_index;
        state.links.insert(
            host.to_string(),
            MemoryLink {
                index: host_index,
                peer: Some(peer.to_string()),
                mtu: None,
                up: false,
            },
        );
        state.next_index += 1;
        let peer_index = state.next_index;
        state.links.insert(
            peer.to_string(),
            MemoryLink {
                index: peer_index,
                peer: Some(host.to_string()),
                mtu: None,
                up: false,
            },
        );

        Ok(())
    }

    async fn set_mtu(&self, name: &str, mtu: u32) -> Result<(), LinkError> {
        let mut state = self.state.lock().await;
        match state.links.get_mut(name) {
            Some(link) => {
                link.mtu = Some(mtu);
                Ok(())
            }
            None => Err(LinkError::ConfigFailed(format!("no such link: {}", name))),
        }
    }

    async fn set_up(&self, name: &str) -> Result<(), LinkError> {
        let mut state = self.state.lock().await;
        match state.links.get_mut(name) {
            Some(link) => {
                link.up = true;
                Ok(())
            }
            None => Err(LinkError::ActivateFailed(format!("no such link: {}", name))),
        }
    }

    async fn add_route(&self, dst: Ipv4Net, device: &str) -> Result<(), LinkError> {
        let mut state = self.state.lock().await;
        if !state.links.contains_key(device) {
            return Err(LinkError::RouteFailed(format!("no such link: {}", device)));
        }
        if state.routes.contains_key(&dst) {
            return Err(LinkError::RouteFailed(format!("route {} exists", dst)));
        }
        state.routes.insert(dst, device.to_string());
        Ok(())
    }

    async fn delete_link(&self, name: &str) -> Result<(), LinkError> {
        let mut state = self.state.lock().await;

        let link = state
            .links
            .remove(name)
            .ok_or_else(|| LinkError::DeleteFailed(format!("no such link: {}", name)))?;

        // deleting one end of a pair removes both, along with their routes
        let mut removed = vec![name.to_string()];
        if let Some(peer) = link.peer {
            state.links.remove(&peer);
            removed.push(peer);
        }
        state.routes.retain(|_, dev| !removed.contains(dev));

        Ok(())
    }

    async fn link_index(&self, name: &str) -> Result<Option<u32>, LinkError> {
        let state = self.state.lock().await;
        Ok(state.links.get(name).map(|link| link.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_lifecycle() {
        let wiring = MemoryWiring::new();

        wiring.create_pair("vethr0", "peer0").await.unwrap();
        assert_eq!(wiring.link_count().await, 2);
        assert!(wiring.link_index("vethr0").await.unwrap().is_some());

        wiring.set_mtu("vethr0", 1500).await.unwrap();
        wiring.set_up("vethr0").await.unwrap();

        let link = wiring.link("vethr0").await.unwrap();
        assert_eq!(link.mtu, Some(1500));
        assert!(link.up);
        assert_eq!(link.peer.as_deref(), Some("peer0"));

        wiring.delete_link("vethr0").await.unwrap();
        assert_eq!(wiring.link_count().await, 0);
        assert!(wiring.link_index("peer0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_fails() {
        let wiring = MemoryWiring::new();

        wiring.create_pair("vethr0", "peer0").await.unwrap();
        let result = wiring.create_pair("vethr0", "peer1").await;
        assert!(matches!(result, Err(LinkError::CreateFailed(_))));
    }

    #[tokio::test]
    async fn test_route_follows_link_deletion() {
        let wiring = MemoryWiring::new();
        let dst: Ipv4Net = "100.64.0.9/32".parse().unwrap();

        wiring.create_pair("vethr0", "peer0").await.unwrap();
        wiring.add_route(dst, "vethr0").await.unwrap();
        assert_eq!(wiring.route(dst).await.as_deref(), Some("vethr0"));

        wiring.delete_link("vethr0").await.unwrap();
        assert!(wiring.route(dst).await.is_none());
    }

    #[tokio::test]
    async fn test_operations_on_missing_link_fail() {
        let wiring = MemoryWiring::new();
        let dst: Ipv4Net = "100.64.0.9/32".parse().unwrap();

        assert!(wiring.set_up("nope").await.is_err());
        assert!(wiring.set_mtu("nope", 1500).await.is_err());
        assert!(wiring.add_route(dst, "nope").await.is_err());
        assert!(wiring.delete_link("nope").await.is_err());
        assert!(wiring.link_index("nope").await.unwrap().is_none());
    }
}
