// Broker error taxonomy and its mapping onto protocol status codes.

pub const STATUS_OK: u16 = 200;
pub const STATUS_ACCEPTED: u16 = 202;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_CONFLICT: u16 = 409;
pub const STATUS_INTERNAL: u16 = 500;
pub const STATUS_NOT_IMPLEMENTED: u16 = 501;
pub const STATUS_UNAVAILABLE: u16 = 503;

/// Every failure a task can report. Messages are caller-facing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    BackendFailure(String),
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    NotImplemented(String),
    #[error("{0}")]
    Store(String),
    #[error("{0}")]
    Unavailable(String),
}

impl BrokerError {
    pub fn status(&self) -> u16 {
        match self {
            BrokerError::NotFound(_) => STATUS_NOT_FOUND,
            BrokerError::Conflict(_) => STATUS_CONFLICT,
            BrokerError::BadRequest(_) => STATUS_BAD_REQUEST,
            BrokerError::BackendFailure(_) => STATUS_INTERNAL,
            BrokerError::Configuration(_) => STATUS_INTERNAL,
            BrokerError::NotImplemented(_) => STATUS_NOT_IMPLEMENTED,
            BrokerError::Store(_) => STATUS_INTERNAL,
            BrokerError::Unavailable(_) => STATUS_UNAVAILABLE,
        }
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BrokerError::NotFound(_) => "not_found",
            BrokerError::Conflict(_) => "conflict",
            BrokerError::BadRequest(_) => "bad_request",
            BrokerError::BackendFailure(_) => "backend_failure",
            BrokerError::Configuration(_) => "configuration",
            BrokerError::NotImplemented(_) => "not_implemented",
            BrokerError::Store(_) => "store",
            BrokerError::Unavailable(_) => "unavailable",
        }
    }

    /// Wraps a driver error, keeping its whole context chain in the message.
    pub fn backend(context: &str, err: &anyhow::Error) -> Self {
        BrokerError::BackendFailure(format!("{context}: {err:#}"))
    }
}
