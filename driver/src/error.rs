use routed_link::LinkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("endpoint already exists: {0}")]
    EndpointExists(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid endpoint state: expected {expected}, got {actual}")]
    InvalidEndpointState { expected: String, actual: String },

    #[error("link error: {0}")]
    Link(#[from] LinkError),
}
