use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DomainError {
    #[error("Invalid reload payload: {0}")]
    InvalidPayload(String),

    #[error("Reload cancelled before completion")]
    ReloadCancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No upstream nameserver configured")]
    NoUpstream,

    #[error("Upstream query failed: {0}")]
    Upstream(String),

    #[error("Upstream query timeout")]
    UpstreamTimeout,

    #[error("Failed to bind DNS listener: {0}")]
    Bind(String),

    #[error("DNS message error: {0}")]
    Proto(String),

    #[error("Metrics registration failed: {0}")]
    Metrics(String),

    #[error("I/O error: {0}")]
    Io(String),
}
