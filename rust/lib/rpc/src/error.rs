use thiserror::Error;

/// Remote call failure.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("network: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a JSON-RPC error object.
    #[error("server error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("auth: {0}")]
    Auth(String),

    #[error("decode: {0}")]
    Decode(String),
}
