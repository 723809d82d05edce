use folio_model::{ModelError, RequestId, RequestStatus, TitleId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CirculationError {
    /// Reserve failed because every copy is out. Callers should route the
    /// patron to the waitlist rather than retry.
    #[error("no available copies of title {0}")]
    OutOfStock(TitleId),

    #[error("an active request or open loan already exists for this title")]
    DuplicateOrActiveRequest,

    #[error("monthly request quota of {limit} reached")]
    MonthlyQuotaExceeded { limit: u32 },

    #[error("title is restricted to premium members")]
    AccessDenied,

    #[error("request {id} is {status}, expected PENDING")]
    InvalidStateTransition {
        id: RequestId,
        status: RequestStatus,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid penalty amount: {0}")]
    InvalidAmount(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CirculationError>;
