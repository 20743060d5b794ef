use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key under which the pool gateway is advertised in pool data.
pub const GATEWAY_DATA_KEY: &str = "com.docker.network.gateway";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpamCapabilitiesResponse {
    #[serde(rename = "RequiresMACAddress")]
    pub requires_mac_address: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddressSpacesResponse {
    pub local_default_address_space: String,
    pub global_default_address_space: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestPoolRequest {
    #[serde(default)]
    pub address_space: String,
    #[serde(default)]
    pub pool: String,
    #[serde(default)]
    pub sub_pool: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
    #[serde(default, rename = "V6")]
    pub v6: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestPoolResponse {
    #[serde(rename = "PoolID")]
    pub pool_id: String,
    pub pool: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestAddressRequest {
    #[serde(rename = "PoolID")]
    pub pool_id: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestAddressResponse {
    pub address: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReleaseAddressRequest {
    #[serde(rename = "PoolID")]
    pub pool_id: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReleasePoolRequest {
    #[serde(rename = "PoolID")]
    pub pool_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_response_key_spellings() {
        let mut data = HashMap::new();
        data.insert(GATEWAY_DATA_KEY.to_string(), "100.64.0.1/32".to_string());

        let resp = RequestPoolResponse {
            pool_id: "routed".to_string(),
            pool: "100.64.0.0/10".to_string(),
            data,
        };

        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["PoolID"], "routed");
        assert_eq!(value["Pool"], "100.64.0.0/10");
        assert_eq!(value["Data"][GATEWAY_DATA_KEY], "100.64.0.1/32");
    }

    #[test]
    fn test_request_pool_request_parses_runtime_json() {
        let raw = r#"{"AddressSpace": "RoutedLocal", "Pool": "", "SubPool": "", "V6": false}"#;
        let req: RequestPoolRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.address_space, "RoutedLocal");
        assert!(!req.v6);
    }
}
