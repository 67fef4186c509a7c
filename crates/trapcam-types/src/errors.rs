use thiserror::Error;

pub type Result<T, E = TrapcamError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum TrapcamError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("camera error: {0}")]
    Camera(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("link error: {0}")]
    Link(String),
    #[error("agent error: {0}")]
    Agent(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
