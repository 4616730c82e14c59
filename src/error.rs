use thiserror::Error;

use crate::codec::CodecError;
use crate::ledger::LedgerError;
use crate::records::DocType;

/// Failures returned by the fare-transfer contract operations.
///
/// Validation failures are raised before anything is written; ledger failures
/// are passed through untouched so the host can abort the transaction.
#[derive(Debug, Error)]
pub enum ContractError {
    /// A create path found a value already stored under the id.
    #[error("record {id} already exists")]
    AlreadyExists { id: String },

    /// No value is stored under the id.
    #[error("record {id} does not exist")]
    NotFound { id: String },

    /// The transit id is not in the catalog.
    #[error("transit id {transit_id} is invalid")]
    InvalidTransit { transit_id: String },

    /// The record exists but belongs to the other variant.
    #[error("record {id} is not a {expected}")]
    WrongDocType { id: String, expected: DocType },

    /// Stored bytes are not a canonical record.
    #[error("malformed record: {0}")]
    MalformedRecord(#[from] CodecError),

    /// Error reported by the host ledger handle.
    #[error(transparent)]
    LedgerUnavailable(#[from] LedgerError),
}

pub type Result<T, E = ContractError> = std::result::Result<T, E>;
