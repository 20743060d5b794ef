use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("link creation failed: {0}")]
    CreateFailed(String),

    #[error("link activation failed: {0}")]
    ActivateFailed(String),

    #[error("link configuration failed: {0}")]
    ConfigFailed(String),

    #[error("route installation failed: {0}")]
    RouteFailed(String),

    #[error("link deletion failed: {0}")]
    DeleteFailed(String),

    #[error("link lookup failed: {0}")]
    LookupFailed(String),
}
