mod ipam;
mod network;

pub use ipam::*;
pub use network::*;
