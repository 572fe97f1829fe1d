//! Error kinds for the engine: each variant says whether the transaction
//! is retried, whether the nonce is rolled back, and what an API caller
//! should see.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no signing accounts configured")]
    NoAccounts,

    #[error("failed to connect to node: {0}")]
    ConnectFailed(String),

    #[error("node or transport rejected the extrinsic: {0}")]
    SubmitRejected(String),

    #[error("extrinsic executed on-chain but failed: {0}")]
    ExtrinsicFailed(String),

    #[error("submitter account {0} is no longer in the pool")]
    AccountMissing(String),

    #[error("retry count exhausted for transaction {0}")]
    RetriesExhausted(String),

    #[error("unknown transaction id: {0}")]
    UnknownTransaction(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<subxt::Error> for EngineError {
    fn from(e: subxt::Error) -> Self {
        EngineError::Internal(e.to_string())
    }
}

impl EngineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::NoAccounts => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::ConnectFailed(_) => StatusCode::BAD_GATEWAY,
            EngineError::SubmitRejected(_) => StatusCode::BAD_GATEWAY,
            EngineError::ExtrinsicFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::AccountMissing(_) => StatusCode::GONE,
            EngineError::RetriesExhausted(_) => StatusCode::CONFLICT,
            EngineError::UnknownTransaction(_) => StatusCode::NOT_FOUND,
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
