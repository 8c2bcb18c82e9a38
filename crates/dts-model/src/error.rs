/// The error taxonomy that repository and endpoint adapters must map their
/// failures onto, and that the dispatcher surfaces to REST clients unchanged.
#[derive(Debug, thiserror::Error)]
pub enum DtsError {
    #[error("transfer {0} not found")]
    TransferNotFound(crate::TransferId),

    #[error("database {0:?} not found")]
    DatabaseNotFound(String),

    #[error("{0:?} is already registered")]
    AlreadyRegistered(String),

    #[error("user is not authorized for this repository")]
    Unauthorized,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("repository temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("invalid search parameter {name:?}: {reason}")]
    InvalidSearchParameter { name: String, reason: String },

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("refused to follow a redirect from https to http at {0}")]
    DowngradedRedirect(String),

    #[error("payload size {actual_gb:.3} GB exceeds the maximum of {max_gb:.3} GB")]
    PayloadTooLarge { actual_gb: f64, max_gb: f64 },

    #[error("no file ids were requested")]
    NoFilesRequested,

    #[error("the journal is not open")]
    NotOpen,

    #[error("the service is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DtsError>;
