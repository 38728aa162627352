use mirror_rpc::RpcError;
use mirror_sql::SQLError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("remote: {0}")]
    Remote(#[from] RpcError),

    #[error("storage: {0}")]
    Storage(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("model {0} is already finalized")]
    AlreadyFinalized(String),

    #[error("unknown field {field} on {model}")]
    UnknownField { model: String, field: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("cannot convert {field}: {message}")]
    Conversion { field: String, message: String },

    /// A many-to-one target row that has no remote counterpart yet.
    #[error("{model} row {id} has never been pushed to the remote side")]
    Unresolvable { model: String, id: i64 },

    #[error("remote write to {model} {remote_ids:?} was refused")]
    Refused { model: String, remote_ids: Vec<i64> },

    #[error("validation: {0}")]
    Validation(String),

    /// The remote mutation succeeded but the local one did not.
    #[error("{model} {remote_ids:?} changed remotely but not locally: {message}")]
    Diverged {
        model: String,
        remote_ids: Vec<i64>,
        message: String,
    },
}

impl From<SQLError> for MirrorError {
    fn from(e: SQLError) -> Self {
        MirrorError::Storage(e.to_string())
    }
}
