mod error;
mod pool;
mod service;

pub use error::IpamError;
pub use pool::{AddressPool, PoolConfig};
pub use service::{GLOBAL_ADDRESS_SPACE, IpamService, LOCAL_ADDRESS_SPACE};
