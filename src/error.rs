use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("metadata discovery failed: {0}")]
    Discovery(String),

    #[error("authorization server does not support dynamic client registration")]
    RegistrationUnsupported,

    #[error("client registration failed: {0}")]
    Registration(String),

    #[error("authorization state mismatch")]
    StateMismatch,

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("malformed bearer token: {0}")]
    MalformedToken(String),

    #[error("no signing key with id \"{0}\" in key set")]
    KeyNotFound(String),

    #[error("key set fetch failed: {0}")]
    KeySetFetch(String),

    #[error("token signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("token issuer mismatch")]
    IssuerMismatch,

    #[error("token expired")]
    TokenExpired,

    #[error("timed out waiting for authorization")]
    Timeout,

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
