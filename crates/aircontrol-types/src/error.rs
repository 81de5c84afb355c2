//! Parse errors for shared types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("invalid session code: {0:?}")]
    InvalidSessionCode(String),

    #[error("invalid pairing code: {0:?}")]
    InvalidPairingCode(String),

    #[error("player index {index} outside 1..={max}")]
    PlayerIndexOutOfRange { index: i64, max: u8 },

    #[error("invalid deep link: {0}")]
    InvalidDeepLink(String),
}
