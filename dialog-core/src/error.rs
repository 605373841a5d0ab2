use crate::store::StoreError;
use thiserror::Error;

/// All failure modes the core surfaces to its callers.
///
/// `Grammar` is only ever produced while loading a script and is fatal to
/// startup; the rest are per-request and map onto the HTTP status codes
/// documented alongside the session runtime's entry points.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{message} ({context})")]
    Grammar { message: String, context: String },

    #[error("login required")]
    Login,

    #[error("invalid token")]
    InvalidToken,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    pub fn grammar(message: impl Into<String>, context: impl Into<String>) -> Self {
        CoreError::Grammar {
            message: message.into(),
            context: context.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
