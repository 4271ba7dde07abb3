use thiserror::Error;

/// Failure talking to the pet-data backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Non-2xx status or a body that does not describe a pet.
    #[error("{message}")]
    Backend { status: Option<u16>, message: String },
}

impl FetchError {
    pub fn backend(status: Option<u16>, message: impl Into<String>) -> Self {
        FetchError::Backend {
            status,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store encoding error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("No listener for {0} messages")]
    Disconnected(&'static str),

    #[error("{0} listener dropped the request without answering")]
    NoResponse(&'static str),
}

#[derive(Error, Debug)]
pub enum CompanionError {
    #[error("{0}")]
    Validation(String),

    #[error("Asset {0} is not equipped on the current pet")]
    AssetMissing(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

pub type Result<T, E = CompanionError> = std::result::Result<T, E>;
