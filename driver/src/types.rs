use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Locally administered prefix for derived endpoint MAC addresses.
pub const MAC_PREFIX: [u8; 2] = [0xde, 0xad];

/// How much of the endpoint id goes into interface names.
const IFNAME_SUFFIX_LEN: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// MTU assigned to the host end of each pair.
    pub mtu: u32,
    /// Prefix for host-side interface names.
    pub host_prefix: String,
    /// Destination prefix the runtime renames the sandbox end to.
    pub sandbox_prefix: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            mtu: 1500,
            host_prefix: "vethr".to_string(),
            sandbox_prefix: "eth".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Created,
    Joined,
    Left,
}

impl std::fmt::Display for EndpointState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointState::Created => write!(f, "created"),
            EndpointState::Joined => write!(f, "joined"),
            EndpointState::Left => write!(f, "left"),
        }
    }
}

/// One container's attachment point: its address, derived MAC, and (while
/// joined) the host interface wired for it.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub id: String,
    pub address: Ipv4Net,
    pub mac_address: String,
    pub host_ifname: Option<String>,
    pub state: EndpointState,
}

/// The single active network and its endpoints.
#[derive(Debug)]
pub struct Network {
    pub id: String,
    pub endpoints: HashMap<String, Endpoint>,
}

impl Network {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            endpoints: HashMap::new(),
        }
    }
}

/// Derive an endpoint MAC from its IPv4 address: fixed prefix, low four
/// octets copied from the address. A pure function of the address, so MACs
/// collide only if addresses do.
pub fn derive_mac(address: Ipv4Addr) -> [u8; 6] {
    let ip = address.octets();
    [MAC_PREFIX[0], MAC_PREFIX[1], ip[0], ip[1], ip[2], ip[3]]
}

pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|octet| format!("{:02x}", octet))
        .collect::<Vec<_>>()
        .join(":")
}

/// Interface-name suffix for an endpoint: the leading characters of its id.
pub fn ifname_suffix(endpoint_id: &str) -> &str {
    &endpoint_id[..endpoint_id.len().min(IFNAME_SUFFIX_LEN)]
}
