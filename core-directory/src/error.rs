use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    /// The server pool is empty; nothing can be queried until it is replaced.
    #[error("No directory server configured")]
    NoEndpoint,

    #[error("Directory server {endpoint} unreachable: {message}")]
    Network { endpoint: String, message: String },

    #[error("Directory rejected request ({status}): {message}")]
    Application { status: u16, message: String },

    #[error("Malformed directory response: {0}")]
    Decode(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl DirectoryError {
    /// `true` for failures worth retrying later, as opposed to bad requests.
    pub fn is_network(&self) -> bool {
        matches!(self, DirectoryError::Network { .. })
    }

    /// Short text a UI can show instead of an empty list.
    pub fn user_message(&self) -> &'static str {
        match self {
            DirectoryError::NoEndpoint => "Station directory is not configured",
            DirectoryError::Network { .. } | DirectoryError::Bridge(_) => {
                "Can't reach the station directory. Check your connection and try again."
            }
            DirectoryError::Application { .. } => "The station directory rejected the request",
            DirectoryError::Decode(_) => "The station directory sent an unexpected response",
        }
    }
}

pub type Result<T> = std::result::Result<T, DirectoryError>;
