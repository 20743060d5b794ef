use crate::error::DriverError;
use crate::types::{
    DriverConfig, Endpoint, EndpointState, Network, derive_mac, format_mac, ifname_suffix,
};
use ipnet::Ipv4Net;
use routed_api::{
    CapabilitiesResponse, CreateEndpointRequest, CreateEndpointResponse, CreateNetworkRequest,
    DeleteEndpointRequest, DeleteNetworkRequest, EndpointInfoRequest, EndpointInfoResponse,
    EndpointInterface, InterfaceName, JoinRequest, JoinResponse, LeaveRequest,
    ROUTE_TYPE_CONNECTED, StaticRoute,
};
use routed_link::LinkWiring;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Network-driver operations over the single active network.
///
/// Owns the endpoint registry behind one lock and drives [`LinkWiring`] for
/// join/leave. Endpoints move `created -> joined -> left`; deletion is legal
/// from `created` or `left`.
pub struct NetworkService {
    config: DriverConfig,
    wiring: Arc<dyn LinkWiring>,
    network: Mutex<Option<Network>>,
}

impl NetworkService {
    pub fn new(config: DriverConfig, wiring: Arc<dyn LinkWiring>) -> Self {
        Self {
            config,
            wiring,
            network: Mutex::new(None),
        }
    }

    pub fn capabilities(&self) -> CapabilitiesResponse {
        CapabilitiesResponse {
            scope: "local".to_string(),
        }
    }

    /// Start a fresh network under the supplied id, discarding any prior
    /// network state. Endpoints of a discarded network become unreachable;
    /// this driver manages exactly one network at a time.
    pub async fn create_network(&self, req: CreateNetworkRequest) -> Result<(), DriverError> {
        tracing::debug!("create network request: {:?}", req);

        let mut guard = self.network.lock().await;
        if let Some(old) = guard.take() {
            if old.endpoints.is_empty() {
                tracing::info!("discarding previous network {}", old.id);
            } else {
                tracing::warn!(
                    "discarding network {} with {} endpoints still registered",
                    old.id,
                    old.endpoints.len()
                );
            }
        }

        *guard = Some(Network::new(&req.network_id));
        tracing::info!("created network {}", req.network_id);
        Ok(())
    }

    /// Clear the network. Endpoints are expected to have left already; any
    /// still holding a host interface get it force-released here so the
    /// kernel interface does not leak.
    pub async fn delete_network(&self, req: DeleteNetworkRequest) -> Result<(), DriverError> {
        tracing::debug!("delete network request: {:?}", req);

        let mut guard = self.network.lock().await;
        let network = match guard.take() {
            Some(network) if network.id == req.network_id => network,
            other => {
                *guard = other;
                return Err(DriverError::UnknownNetwork(req.network_id));
            }
        };

        for endpoint in network.endpoints.values() {
            if let Some(ifname) = &endpoint.host_ifname {
                tracing::warn!(
                    "endpoint {} still joined at network deletion, removing {}",
                    endpoint.id,
                    ifname
                );
                if let Err(e) = self.wiring.delete_link(ifname).await {
                    tracing::warn!("unable to remove {}: {}", ifname, e);
                }
            }
        }

        tracing::info!("deleted network {}", network.id);
        Ok(())
    }

    /// Register an endpoint with its runtime-assigned address and return the
    /// derived MAC. No interface exists until the endpoint joins.
    pub async fn create_endpoint(
        &self,
        req: CreateEndpointRequest,
    ) -> Result<CreateEndpointResponse, DriverError> {
        tracing::debug!("create endpoint request: {:?}", req);

        let mut guard = self.network.lock().await;
        let network = Self::network_mut(&mut guard, &req.network_id)?;

        if network.endpoints.contains_key(&req.endpoint_id) {
            return Err(DriverError::EndpointExists(req.endpoint_id));
        }

        let address: Ipv4Net = req
            .interface
            .address
            .parse()
            .map_err(|_| DriverError::InvalidAddress(req.interface.address.clone()))?;

        let mac_address = format_mac(&derive_mac(address.addr()));
        if !req.interface.mac_address.is_empty()
            && !req.interface.mac_address.eq_ignore_ascii_case(&mac_address)
        {
            return Err(DriverError::InvalidAddress(format!(
                "requested mac {} does not match derived {}",
                req.interface.mac_address, mac_address
            )));
        }

        network.endpoints.insert(
            req.endpoint_id.clone(),
            Endpoint {
                id: req.endpoint_id.clone(),
                address,
                mac_address: mac_address.clone(),
                host_ifname: None,
                state: EndpointState::Created,
            },
        );
        tracing::info!(
            "created endpoint {} at {} ({})",
            req.endpoint_id,
            address,
            mac_address
        );

        Ok(CreateEndpointResponse {
            interface: Some(EndpointInterface {
                mac_address,
                ..Default::default()
            }),
        })
    }

    pub async fn delete_endpoint(&self, req: DeleteEndpointRequest) -> Result<(), DriverError> {
        tracing::debug!("delete endpoint request: {:?}", req);

        let mut guard = self.network.lock().await;
        let network = Self::network_mut(&mut guard, &req.network_id)?;

        let endpoint = network
            .endpoints
            .get(&req.endpoint_id)
            .ok_or_else(|| DriverError::UnknownEndpoint(req.endpoint_id.clone()))?;

        if endpoint.state == EndpointState::Joined {
            return Err(DriverError::InvalidEndpointState {
                expected: format!("{} or {}", EndpointState::Created, EndpointState::Left),
                actual: endpoint.state.to_string(),
            });
        }

        network.endpoints.remove(&req.endpoint_id);
        tracing::info!("deleted endpoint {}", req.endpoint_id);
        Ok(())
    }

    /// Informational extension point; currently no attributes are exposed.
    pub async fn endpoint_info(
        &self,
        req: EndpointInfoRequest,
    ) -> Result<EndpointInfoResponse, DriverError> {
        tracing::debug!("endpoint info request: {:?}", req);

        let mut guard = self.network.lock().await;
        let network = Self::network_mut(&mut guard, &req.network_id)?;
        if !network.endpoints.contains_key(&req.endpoint_id) {
            return Err(DriverError::UnknownEndpoint(req.endpoint_id));
        }

        Ok(EndpointInfoResponse {
            value: HashMap::new(),
        })
    }

    /// Wire the endpoint's data path: create the veth pair, bring the host
    /// end up, and route the endpoint's address at it. Returns the sandbox
    /// end for the runtime to move, plus a connected default route.
    pub async fn join(&self, req: JoinRequest) -> Result<JoinResponse, DriverError> {
        tracing::debug!("join request: {:?}", req);

        let mut guard = self.network.lock().await;
        let network = Self::network_mut(&mut guard, &req.network_id)?;
        let endpoint = network
            .endpoints
            .get_mut(&req.endpoint_id)
            .ok_or_else(|| DriverError::UnknownEndpoint(req.endpoint_id.clone()))?;

        if endpoint.state != EndpointState::Created {
            return Err(DriverError::InvalidEndpointState {
                expected: EndpointState::Created.to_string(),
                actual: endpoint.state.to_string(),
            });
        }

        let suffix = ifname_suffix(&req.endpoint_id);
        let peer_name = suffix.to_string();
        let host_name = format!("{}{}", self.config.host_prefix, suffix);

        tracing::info!(
            "joining endpoint {} to sandbox {}",
            req.endpoint_id,
            req.sandbox_key
        );

        if let Err(e) = self.wiring.create_pair(&host_name, &peer_name).await {
            tracing::error!(
                "unable to create veth pair {} <-> {}: {}",
                host_name,
                peer_name,
                e
            );
            return Err(e.into());
        }

        if let Err(e) = self.wiring.set_mtu(&host_name, self.config.mtu).await {
            // the link stays usable at its default MTU
            tracing::warn!("unable to set mtu {} on {}: {}", self.config.mtu, host_name, e);
        }

        if let Err(e) = self.wiring.set_up(&host_name).await {
            tracing::error!("unable to bring up {}: {}", host_name, e);
            // remove the pair again so a failed join leaves no interface behind
            if let Err(cleanup) = self.wiring.delete_link(&host_name).await {
                tracing::warn!("cleanup of {} failed: {}", host_name, cleanup);
            }
            return Err(e.into());
        }

        let route_dst = Ipv4Net::new_assert(endpoint.address.addr(), 32);
        if let Err(e) = self.wiring.add_route(route_dst, &host_name).await {
            // reachability is degraded, but the join itself stands
            tracing::warn!("unable to add route {} dev {}: {}", route_dst, host_name, e);
        }

        endpoint.host_ifname = Some(host_name.clone());
        endpoint.state = EndpointState::Joined;
        tracing::info!("endpoint {} joined via {}", req.endpoint_id, host_name);

        Ok(JoinResponse {
            interface_name: InterfaceName {
                src_name: peer_name,
                dst_prefix: self.config.sandbox_prefix.clone(),
            },
            // all traffic is directly connected; no gateway is involved
            static_routes: vec![StaticRoute {
                destination: "0.0.0.0/0".to_string(),
                route_type: ROUTE_TYPE_CONNECTED,
                next_hop: String::new(),
            }],
            ..Default::default()
        })
    }

    /// Tear the endpoint's host interface down. A host interface that has
    /// already vanished is logged, not an error.
    pub async fn leave(&self, req: LeaveRequest) -> Result<(), DriverError> {
        tracing::debug!("leave request: {:?}", req);

        let mut guard = self.network.lock().await;
        let network = Self::network_mut(&mut guard, &req.network_id)?;
        let endpoint = network
            .endpoints
            .get_mut(&req.endpoint_id)
            .ok_or_else(|| DriverError::UnknownEndpoint(req.endpoint_id.clone()))?;

        if endpoint.state != EndpointState::Joined {
            return Err(DriverError::InvalidEndpointState {
                expected: EndpointState::Joined.to_string(),
                actual: endpoint.state.to_string(),
            });
        }

        if let Some(ifname) = endpoint.host_ifname.take() {
            match self.wiring.link_index(&ifname).await {
                Ok(Some(_)) => {
                    if let Err(e) = self.wiring.delete_link(&ifname).await {
                        tracing::warn!("unable to delete {}: {}", ifname, e);
                    }
                }
                Ok(None) => tracing::debug!("host interface {} already gone", ifname),
                Err(e) => tracing::warn!("lookup of {} failed: {}", ifname, e),
            }
        }

        endpoint.state = EndpointState::Left;
        tracing::info!("endpoint {} left network {}", req.endpoint_id, network.id);
        Ok(())
    }

    fn network_mut<'a>(
        guard: &'a mut Option<Network>,
        network_id: &str,
    ) -> Result<&'a mut Network, DriverError> {
        match guard.as_mut() {
            Some(network) if network.id == network_id => Ok(network),
            _ => Err(DriverError::UnknownNetwork(network_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use routed_link::{LinkError, MemoryWiring};

    fn test_service() -> (NetworkService, Arc<MemoryWiring>) {
        let wiring = Arc::new(MemoryWiring::new());
        let service = NetworkService::new(DriverConfig::default(), wiring.clone());
        (service, wiring)
    }

    fn create_network_req(id: &str) -> CreateNetworkRequest {
        CreateNetworkRequest {
            network_id: id.to_string(),
            ..Default::default()
        }
    }

    fn create_endpoint_req(network: &str, endpoint: &str, address: &str) -> CreateEndpointRequest {
        CreateEndpointRequest {
            network_id: network.to_string(),
            endpoint_id: endpoint.to_string(),
            interface: EndpointInterface {
                address: address.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn join_req(network: &str, endpoint: &str) -> JoinRequest {
        JoinRequest {
            network_id: network.to_string(),
            endpoint_id: endpoint.to_string(),
            sandbox_key: "/var/run/sandbox".to_string(),
            ..Default::default()
        }
    }

    fn leave_req(network: &str, endpoint: &str) -> LeaveRequest {
        LeaveRequest {
            network_id: network.to_string(),
            endpoint_id: endpoint.to_string(),
        }
    }

    #[tokio::test]
    async fn test_capabilities_scope_is_local() {
        let (service, _) = test_service();
        assert_eq!(service.capabilities().scope, "local");
    }

    #[tokio::test]
    async fn test_full_endpoint_lifecycle() {
        let (service, wiring) = test_service();
        let route_dst: Ipv4Net = "100.64.0.9/32".parse().unwrap();

        service.create_network(create_network_req("n1")).await.unwrap();

        let created = service
            .create_endpoint(create_endpoint_req("n1", "e1", "100.64.0.9/32"))
            .await
            .unwrap();
        let iface = created.interface.unwrap();
        assert_eq!(iface.mac_address, "de:ad:64:40:00:09");
        assert!(iface.address.is_empty());

        let joined = service.join(join_req("n1", "e1")).await.unwrap();
        assert_eq!(joined.interface_name.src_name, "e1");
        assert_eq!(joined.interface_name.dst_prefix, "eth");
        assert_eq!(joined.static_routes.len(), 1);
        assert_eq!(joined.static_routes[0].destination, "0.0.0.0/0");
        assert_eq!(joined.static_routes[0].route_type, ROUTE_TYPE_CONNECTED);
        assert!(joined.static_routes[0].next_hop.is_empty());

        let host_link = wiring.link("vethre1").await.unwrap();
        assert!(host_link.up);
        assert_eq!(host_link.mtu, Some(1500));
        assert_eq!(wiring.route(route_dst).await.as_deref(), Some("vethre1"));

        service.leave(leave_req("n1", "e1")).await.unwrap();
        assert!(wiring.link("vethre1").await.is_none());
        assert!(wiring.route(route_dst).await.is_none());

        service
            .delete_endpoint(DeleteEndpointRequest {
                network_id: "n1".to_string(),
                endpoint_id: "e1".to_string(),
            })
            .await
            .unwrap();

        service
            .delete_network(DeleteNetworkRequest {
                network_id: "n1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(wiring.link_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_endpoint_requires_network() {
        let (service, _) = test_service();

        let result = service
            .create_endpoint(create_endpoint_req("n1", "e1", "100.64.0.9/32"))
            .await;
        assert!(matches!(result, Err(DriverError::UnknownNetwork(_))));
    }

    #[tokio::test]
    async fn test_create_endpoint_rejects_bad_address() {
        let (service, _) = test_service();
        service.create_network(create_network_req("n1")).await.unwrap();

        let result = service
            .create_endpoint(create_endpoint_req("n1", "e1", "not-an-address"))
            .await;
        assert!(matches!(result, Err(DriverError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_create_endpoint_rejects_duplicate_id() {
        let (service, _) = test_service();
        service.create_network(create_network_req("n1")).await.unwrap();

        service
            .create_endpoint(create_endpoint_req("n1", "e1", "100.64.0.9/32"))
            .await
            .unwrap();
        let result = service
            .create_endpoint(create_endpoint_req("n1", "e1", "100.64.0.10/32"))
            .await;
        assert!(matches!(result, Err(DriverError::EndpointExists(_))));
    }

    #[tokio::test]
    async fn test_create_endpoint_rejects_foreign_mac() {
        let (service, _) = test_service();
        service.create_network(create_network_req("n1")).await.unwrap();

        let mut req = create_endpoint_req("n1", "e1", "100.64.0.9/32");
        req.interface.mac_address = "02:00:00:00:00:01".to_string();
        let result = service.create_endpoint(req).await;
        assert!(matches!(result, Err(DriverError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_join_requires_created_state() {
        let (service, _) = test_service();
        service.create_network(create_network_req("n1")).await.unwrap();
        service
            .create_endpoint(create_endpoint_req("n1", "e1", "100.64.0.9/32"))
            .await
            .unwrap();

        service.join(join_req("n1", "e1")).await.unwrap();
        let result = service.join(join_req("n1", "e1")).await;
        assert!(matches!(
            result,
            Err(DriverError::InvalidEndpointState { .. })
        ));
    }

    #[tokio::test]
    async fn test_leave_requires_joined_state() {
        let (service, _) = test_service();
        service.create_network(create_network_req("n1")).await.unwrap();
        service
            .create_endpoint(create_endpoint_req("n1", "e1", "100.64.0.9/32"))
            .await
            .unwrap();

        let result = service.leave(leave_req("n1", "e1")).await;
        assert!(matches!(
            result,
            Err(DriverError::InvalidEndpointState { .. })
        ));
    }

    #[tokio::test]
    async fn test_join_surfaces_creation_failure_without_state_change() {
        let (service, wiring) = test_service();
        service.create_network(create_network_req("n1")).await.unwrap();
        service
            .create_endpoint(create_endpoint_req("n1", "e1", "100.64.0.9/32"))
            .await
            .unwrap();

        // occupy the host-side name so pair creation collides
        wiring.create_pair("vethre1", "tmp0").await.unwrap();

        let result = service.join(join_req("n1", "e1")).await;
        assert!(matches!(
            result,
            Err(DriverError::Link(LinkError::CreateFailed(_)))
        ));

        // the endpoint is still joinable once the collision is gone
        wiring.delete_link("vethre1").await.unwrap();
        service.join(join_req("n1", "e1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_leave_tolerates_missing_host_interface() {
        let (service, wiring) = test_service();
        service.create_network(create_network_req("n1")).await.unwrap();
        service
            .create_endpoint(create_endpoint_req("n1", "e1", "100.64.0.9/32"))
            .await
            .unwrap();
        service.join(join_req("n1", "e1")).await.unwrap();

        // someone deleted the interface out from under the driver
        wiring.delete_link("vethre1").await.unwrap();

        service.leave(leave_req("n1", "e1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_joined_endpoint_is_rejected() {
        let (service, _) = test_service();
        service.create_network(create_network_req("n1")).await.unwrap();
        service
            .create_endpoint(create_endpoint_req("n1", "e1", "100.64.0.9/32"))
            .await
            .unwrap();
        service.join(join_req("n1", "e1")).await.unwrap();

        let result = service
            .delete_endpoint(DeleteEndpointRequest {
                network_id: "n1".to_string(),
                endpoint_id: "e1".to_string(),
            })
            .await;
        assert!(matches!(
            result,
            Err(DriverError::InvalidEndpointState { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_unknown_endpoint() {
        let (service, _) = test_service();
        service.create_network(create_network_req("n1")).await.unwrap();

        let result = service
            .delete_endpoint(DeleteEndpointRequest {
                network_id: "n1".to_string(),
                endpoint_id: "nope".to_string(),
            })
            .await;
        assert!(matches!(result, Err(DriverError::UnknownEndpoint(_))));
    }

    #[tokio::test]
    async fn test_delete_network_releases_still_joined_endpoints() {
        let (service, wiring) = test_service();
        service.create_network(create_network_req("n1")).await.unwrap();
        service
            .create_endpoint(create_endpoint_req("n1", "e1", "100.64.0.9/32"))
            .await
            .unwrap();
        service.join(join_req("n1", "e1")).await.unwrap();
        assert!(wiring.link("vethre1").await.is_some());

        // no leave/delete-endpoint first; the driver must not leak the link
        service
            .delete_network(DeleteNetworkRequest {
                network_id: "n1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(wiring.link_count().await, 0);
    }

    #[tokio::test]
    async fn test_delete_network_checks_id() {
        let (service, _) = test_service();
        service.create_network(create_network_req("n1")).await.unwrap();

        let result = service
            .delete_network(DeleteNetworkRequest {
                network_id: "other".to_string(),
            })
            .await;
        assert!(matches!(result, Err(DriverError::UnknownNetwork(_))));

        // the original network survives a mismatched delete
        service
            .create_endpoint(create_endpoint_req("n1", "e1", "100.64.0.9/32"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_network_replaces_previous() {
        let (service, _) = test_service();
        service.create_network(create_network_req("n1")).await.unwrap();
        service
            .create_endpoint(create_endpoint_req("n1", "e1", "100.64.0.9/32"))
            .await
            .unwrap();

        service.create_network(create_network_req("n2")).await.unwrap();

        // endpoints of the discarded network are gone
        let result = service
            .create_endpoint(create_endpoint_req("n1", "e2", "100.64.0.10/32"))
            .await;
        assert!(matches!(result, Err(DriverError::UnknownNetwork(_))));
        service
            .create_endpoint(create_endpoint_req("n2", "e1", "100.64.0.9/32"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_endpoint_info_is_empty() {
        let (service, _) = test_service();
        service.create_network(create_network_req("n1")).await.unwrap();
        service
            .create_endpoint(create_endpoint_req("n1", "e1", "100.64.0.9/32"))
            .await
            .unwrap();

        let info = service
            .endpoint_info(EndpointInfoRequest {
                network_id: "n1".to_string(),
                endpoint_id: "e1".to_string(),
            })
            .await
            .unwrap();
        assert!(info.value.is_empty());

        let result = service
            .endpoint_info(EndpointInfoRequest {
                network_id: "n1".to_string(),
                endpoint_id: "nope".to_string(),
            })
            .await;
        assert!(matches!(result, Err(DriverError::UnknownEndpoint(_))));
    }
}
