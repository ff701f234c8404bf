use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    // Configuration errors
    #[error("Missing required environment variable: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid config: {message}")]
    ConfigValidation { message: String },

    // Store errors
    #[error("Failed to load store from '{path}': {source}")]
    StoreLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse store file '{path}': {source}")]
    StoreParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to save store to '{path}': {source}")]
    StoreSave {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Store error: {message}")]
    Store { message: String },

    // Login errors
    #[error("Discord authentication failed: {message}")]
    ProviderAuth { message: String },

    #[error("Discord account {external_id} has no email address")]
    MissingEmail { external_id: String },

    // Panel API errors
    #[error("Panel API returned {status}: {message}")]
    Provisioning { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Internal {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
