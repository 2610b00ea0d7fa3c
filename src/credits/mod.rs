//! Upload credit ledger.
//!
//! Gates the metered upload action on a per-wallet balance that may live
//! on-chain. The backend is selected once at startup: a deployed credit
//! contract on the active chain gives the on-chain path, anything else the
//! local simulation. A runtime on-chain failure still degrades per call to
//! the simulated path, so the caller-visible contract (bool result, updated
//! balance, one audit-trail transaction) is identical either way.

pub mod ledger;
pub mod types;

pub use ledger::{CreditContract, CreditLedger, HttpCreditContract, LedgerBackend};
pub use types::{
    CreditBalance, CreditPackage, LedgerTransaction, TransactionKind, UploadCheck, DEFAULT_GRANT,
    MAX_UPLOAD_BYTES, UNLIMITED_CREDITS,
};

use thiserror::Error;

/// Error types for credit operations. Contract failures never reach the
/// caller - they trigger the simulated fallback instead.
#[derive(Debug, Error)]
pub enum CreditError {
    #[error("Contract call failed: {0}")]
    Contract(String),

    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),
}
