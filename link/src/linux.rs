use crate::error::LinkError;
use crate::wiring::LinkWiring;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use tokio::process::Command;

/// Wires links through the `ip(8)` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpCommandWiring;

impl IpCommandWiring {
    pub fn new() -> Self {
        Self
    }

    /// Execute an ip command, returning stderr as the error message on
    /// failure.
    async fn exec_ip(args: &[&str]) -> Result<(), String> {
        let output = Command::new("ip")
            .args(args)
            .output()
            .await
            .map_err(|e| format!("failed to execute ip: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!("ip {} failed: {}", args.join(" "), stderr);
            return Err(stderr);
        }

        Ok(())
    }
}

#[async_trait]
impl LinkWiring for IpCommandWiring {
    async fn create_pair(&self, host: &str, peer: &str) -> Result<(), LinkError> {
        tracing::info!("creating veth pair {} <-> {}", host, peer);
        Self::exec_ip(&["link", "add", host, "type", "veth", "peer", "name", peer])
            .await
            .map_err(LinkError::CreateFailed)
    }

    async fn set_mtu(&self, name: &str, mtu: u32) -> Result<(), LinkError> {
        let mtu = mtu.to_string();
        Self::exec_ip(&["link", "set", "dev", name, "mtu", &mtu])
            .await
            .map_err(LinkError::ConfigFailed)
    }

    async fn set_up(&self, name: &str) -> Result<(), LinkError> {
        tracing::info!("bringing link {} up", name);
        Self::exec_ip(&["link", "set", "dev", name, "up"])
            .await
            .map_err(LinkError::ActivateFailed)
    }

    async fn add_route(&self, dst: Ipv4Net, device: &str) -> Result<(), LinkError> {
        let dst = dst.to_string();
        tracing::info!("adding route {} dev {}", dst, device);
        Self::exec_ip(&["route", "add", &dst, "dev", device])
            .await
            .map_err(LinkError::RouteFailed)
    }

    async fn delete_link(&self, name: &str) -> Result<(), LinkError> {
        tracing::info!("deleting link {}", name);
        Self::exec_ip(&["link", "delete", name])
            .await
            .map_err(LinkError::DeleteFailed)
    }

    async fn link_index(&self, name: &str) -> Result<Option<u32>, LinkError> {
        match nix::net::if_::if_nametoindex(name) {
            Ok(index) => Ok(Some(index)),
            Err(nix::errno::Errno::ENODEV) | Err(nix::errno::Errno::ENXIO) => Ok(None),
            Err(e) => Err(LinkError::LookupFailed(format!("{}: {}", name, e))),
        }
    }
}
