mod error;
mod service;
mod types;

pub use error::DriverError;
pub use service::NetworkService;
pub use types::*;
