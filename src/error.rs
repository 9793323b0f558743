use actix_web::http::StatusCode;
use actix_web::ResponseError;

use thiserror::Error;

use uuid::Uuid;

use crate::crypto::TokenError;
use crate::repo::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors of the registration workflow
#[derive(Debug, Error)]
pub enum Error {
    // Input errors
    #[error("{0}")]
    ParsingError(String),
    // Missing records
    #[error("Offering {0} not found")]
    OfferingNotFound(Uuid),
    #[error("Coupon {0} not found")]
    CouponNotFound(Uuid),
    #[error("Registration entry {0} not found")]
    EntryNotFound(Uuid),
    // Policy errors
    #[error("Registration for offering {0} is closed")]
    DeadlinePassed(Uuid),
    // Commit retries exhausted
    #[error("Registration transaction failed after {0} attempts")]
    TransactionFailed(u32),
    // Storage errors
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type RestResult<T> = std::result::Result<T, RestError>;

#[derive(Debug, Error)]
pub enum RestError {
    #[error("Parse Error: {0}")]
    ParseError(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized Access")]
    FailedToAuthenticate(#[source] anyhow::Error),

    #[error("Service Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal Server Error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<Error> for RestError {
    fn from(e: Error) -> Self {
        match e {
            Error::ParsingError(msg) => Self::ParseError(msg),
            e @ (Error::OfferingNotFound(_)
            | Error::CouponNotFound(_)
            | Error::EntryNotFound(_)) => Self::NotFound(e.to_string()),
            e @ Error::DeadlinePassed(_) => Self::Conflict(e.to_string()),
            e @ Error::TransactionFailed(_) => Self::Unavailable(e.to_string()),
            Error::Store(StoreError::Duplicate(msg)) => Self::Conflict(msg),
            Error::Store(e) => {
                tracing::error!(error.cause_chain = ?e, "Registration store failure");
                Self::InternalError("Database error".into())
            }
        }
    }
}

impl From<TokenError> for RestError {
    fn from(e: TokenError) -> Self {
        Self::FailedToAuthenticate(e.into())
    }
}

impl From<StoreError> for RestError {
    fn from(e: StoreError) -> Self {
        Error::Store(e).into()
    }
}

impl ResponseError for RestError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ParseError(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::FailedToAuthenticate(_) => StatusCode::UNAUTHORIZED,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError(_) | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
