use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Store(#[from] relay_traits::error::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed descriptor {name}: {reason}")]
    MalformedDescriptor { name: String, reason: String },

    #[error("Malformed manifest {name}: {reason}")]
    MalformedManifest { name: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
