use crate::error::IpamError;
use crate::pool::{AddressPool, PoolConfig};
use routed_api::{
    AddressSpacesResponse, GATEWAY_DATA_KEY, IpamCapabilitiesResponse, ReleaseAddressRequest,
    ReleasePoolRequest, RequestAddressRequest, RequestAddressResponse, RequestPoolRequest,
    RequestPoolResponse,
};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tokio::sync::Mutex;

pub const LOCAL_ADDRESS_SPACE: &str = "RoutedLocal";
pub const GLOBAL_ADDRESS_SPACE: &str = "RoutedGlobal";

/// IPAM driver operations over the single configured address pool.
///
/// The pool sits behind one lock; the transport may call in from any number
/// of request contexts concurrently.
pub struct IpamService {
    pool: Mutex<AddressPool>,
}

impl IpamService {
    pub fn new(config: PoolConfig) -> Result<Self, IpamError> {
        let pool = AddressPool::new(config)?;
        tracing::info!(
            "serving pool {} ({}, gateway {})",
            pool.id(),
            pool.subnet(),
            pool.gateway()
        );
        Ok(Self {
            pool: Mutex::new(pool),
        })
    }

    pub fn capabilities(&self) -> IpamCapabilitiesResponse {
        IpamCapabilitiesResponse {
            requires_mac_address: false,
        }
    }

    pub fn default_address_spaces(&self) -> AddressSpacesResponse {
        AddressSpacesResponse {
            local_default_address_space: LOCAL_ADDRESS_SPACE.to_string(),
            global_default_address_space: GLOBAL_ADDRESS_SPACE.to_string(),
        }
    }

    /// Return the configured pool's identity. Idempotent: every call yields
    /// the same id, subnet and gateway.
    pub async fn request_pool(
        &self,
        req: RequestPoolRequest,
    ) -> Result<RequestPoolResponse, IpamError> {
        tracing::debug!("pool request: {:?}", req);

        if req.v6 {
            return Err(IpamError::InvalidAddress(
                "IPv6 pools are not supported".to_string(),
            ));
        }
        if !req.pool.is_empty() {
            tracing::debug!("ignoring requested pool {}, serving configured pool", req.pool);
        }

        let pool = self.pool.lock().await;
        let mut data = HashMap::new();
        data.insert(
            GATEWAY_DATA_KEY.to_string(),
            format!("{}/32", pool.gateway()),
        );

        let resp = RequestPoolResponse {
            pool_id: pool.id().to_string(),
            pool: pool.subnet().to_string(),
            data,
        };
        tracing::info!("pool request served: {} {}", resp.pool_id, resp.pool);
        Ok(resp)
    }

    pub async fn request_address(
        &self,
        req: RequestAddressRequest,
    ) -> Result<RequestAddressResponse, IpamError> {
        tracing::debug!("address request: {:?}", req);

        let mut pool = self.pool.lock().await;
        if req.pool_id != pool.id() {
            return Err(IpamError::UnknownPool(req.pool_id));
        }
        if !req.address.is_empty() {
            tracing::debug!("ignoring preferred address {}", req.address);
        }

        let address = pool.request_address()?;
        tracing::info!("allocated {} from pool {}", address, pool.id());
        Ok(RequestAddressResponse {
            address: format!("{}/32", address),
            data: HashMap::new(),
        })
    }

    pub async fn release_address(&self, req: ReleaseAddressRequest) -> Result<(), IpamError> {
        tracing::debug!("address release: {:?}", req);

        let mut pool = self.pool.lock().await;
        if req.pool_id != pool.id() {
            return Err(IpamError::UnknownPool(req.pool_id));
        }

        let address = parse_address(&req.address)?;
        pool.release_address(address);
        tracing::info!("released {} from pool {}", address, pool.id());
        Ok(())
    }

    pub async fn release_pool(&self, req: ReleasePoolRequest) -> Result<(), IpamError> {
        tracing::debug!("pool release: {:?}", req);

        let pool = self.pool.lock().await;
        pool.release_pool(&req.pool_id)?;
        tracing::info!("pool {} released", req.pool_id);
        Ok(())
    }
}

/// Parse an address that may arrive bare ("100.64.0.9") or with a mask
/// ("100.64.0.9/32").
fn parse_address(raw: &str) -> Result<Ipv4Addr, IpamError> {
    let bare = raw.split('/').next().unwrap_or(raw);
    bare.parse()
        .map_err(|_| IpamError::InvalidAddress(raw.to_string()))
}
